use super::codec::{self, decode_address};
use super::record::Record;
use super::{Bucket, StoreError};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A wallet that received funds from at least one tracked exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub address: Address,
    pub total_received: U256,
    pub total_spent: U256,
    /// Names of every exchange that has funded this wallet
    pub from_exchanges: BTreeSet<String>,
}

#[derive(Serialize, Deserialize)]
struct AccountValue {
    #[serde(with = "codec::uint_bytes")]
    total_received: U256,
    #[serde(with = "codec::uint_bytes")]
    total_spent: U256,
    from_exchanges: BTreeSet<String>,
}

impl Account {
    pub fn new(address: Address) -> Self {
        Self {
            address,
            total_received: U256::zero(),
            total_spent: U256::zero(),
            from_exchanges: BTreeSet::new(),
        }
    }

    /// Credit a transfer coming out of `exchange`
    pub fn record_transfer(&mut self, exchange: &str, value: U256) {
        self.total_received = self.total_received.saturating_add(value);
        if !self.from_exchanges.contains(exchange) {
            self.from_exchanges.insert(exchange.to_string());
        }
    }

    pub fn record_spend(&mut self, value: U256) {
        self.total_spent = self.total_spent.saturating_add(value);
    }
}

impl Record for Account {
    type Key = Address;

    const BUCKET: Bucket = Bucket::Account;

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
        codec::encode_value(&AccountValue {
            total_received: self.total_received,
            total_spent: self.total_spent,
            from_exchanges: self.from_exchanges.clone(),
        })
    }

    fn decode_record(address: Address, raw: &[u8]) -> Result<Self, StoreError> {
        let value: AccountValue = codec::decode_value(raw)?;
        Ok(Self {
            address,
            total_received: value.total_received,
            total_spent: value.total_spent,
            from_exchanges: value.from_exchanges,
        })
    }
}
