use super::codec::{self, decode_hash};
use super::record::{self, Record};
use super::{Bucket, StoreError};
use ethers::types::{Address, H256, U256};
use rusqlite::Transaction;
use serde::{Deserialize, Serialize};

/// One detected swap, keyed by its transaction hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Swap {
    pub tx_hash: H256,
    pub wallet: Address,
    pub token: Address,
    pub path: Vec<Address>,
    pub factory: Address,
    pub price: U256,
    pub value: U256,
}

#[derive(Serialize, Deserialize)]
struct SwapValue {
    #[serde(with = "codec::address_bytes")]
    wallet: Address,
    #[serde(with = "codec::address_bytes")]
    token: Address,
    #[serde(with = "codec::address_list")]
    path: Vec<Address>,
    #[serde(with = "codec::address_bytes")]
    factory: Address,
    #[serde(with = "codec::uint_bytes")]
    price: U256,
    #[serde(with = "codec::uint_bytes")]
    value: U256,
}

impl Swap {
    /// Administrative removal of a recorded swap
    ///
    /// Aggregates already credited from this swap are left as they are.
    pub fn delete(tx: &Transaction<'_>, tx_hash: &H256) -> Result<bool, StoreError> {
        let removed = record::delete::<Swap>(tx, tx_hash)?;
        if removed {
            log::warn!("🗑️  Deleted swap {:?}", tx_hash);
        }
        Ok(removed)
    }
}

impl Record for Swap {
    type Key = H256;

    const BUCKET: Bucket = Bucket::Swap;

    fn key(&self) -> H256 {
        self.tx_hash
    }

    fn encode_key(key: &H256) -> Vec<u8> {
        key.as_bytes().to_vec()
    }

    fn decode_key(raw: &[u8]) -> Result<H256, StoreError> {
        decode_hash(Self::BUCKET, raw)
    }

    fn encode_value(&self) -> Result<Vec<u8>, StoreError> {
        codec::encode_value(&SwapValue {
            wallet: self.wallet,
            token: self.token,
            path: self.path.clone(),
            factory: self.factory,
            price: self.price,
            value: self.value,
        })
    }

    fn decode_record(tx_hash: H256, raw: &[u8]) -> Result<Self, StoreError> {
        let value: SwapValue = codec::decode_value(raw)?;
        Ok(Self {
            tx_hash,
            wallet: value.wallet,
            token: value.token,
            path: value.path,
            factory: value.factory,
            price: value.price,
            value: value.value,
        })
    }
}
