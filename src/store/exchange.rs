use super::codec::decode_address;
use super::record::Record;
use super::{Bucket, StoreError};
use ethers::types::Address;
use serde::{Deserialize, Serialize};

/// A wallet known to belong to a centralized exchange
///
/// The value stored is the bare UTF-8 name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub name: String,
    pub address: Address,
}

impl Exchange {
    pub fn new(name: impl Into<String>, address: Address) -> Self {
        Self {
            name: name.into(),
            address,
        }
    }
}

impl Record for Exchange {
    type Key = Address;

    const BUCKET: Bucket = Bucket::Exchange;

    fn key(&self) -> Address {
        self.address
    }

    fn encode_key(key: &Address) -> Vec<u8> {
        key.as_bytes().to_vec()
    }

    fn decode_key(raw: &[u8]) -> Result<Address, StoreError> {
        decode_address(Self::BUCKET, raw)
    }

    fn encode_value(&self) -> Result<Vec<u8>, StoreError> {
        Ok(self.name.as_bytes().to_vec())
    }

    fn decode_record(address: Address, raw: &[u8]) -> Result<Self, StoreError> {
        let name = String::from_utf8(raw.to_vec()).map_err(|e| StoreError::InvalidKey {
            bucket: Self::BUCKET,
            reason: format!("exchange name is not UTF-8: {}", e),
        })?;
        Ok(Self { name, address })
    }
}
