use super::codec::{self, decode_address};
use super::record::Record;
use super::{Bucket, StoreError};
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// An ERC-20 token bought by a tracked wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub address: Address,
    pub symbol: String,
    pub decimals: u8,
    /// Price at first sighting, in wei per whole token. Zero until set.
    pub price: U256,
    pub total_bought: U256,
    pub times_bought: u64,
}

#[derive(Serialize, Deserialize)]
struct TokenValue {
    symbol: String,
    decimals: u8,
    #[serde(with = "codec::uint_bytes")]
    price: U256,
    #[serde(with = "codec::uint_bytes")]
    total_bought: U256,
    times_bought: u64,
}

impl Token {
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            price: U256::zero(),
            total_bought: U256::zero(),
            times_bought: 0,
        }
    }

    /// One whole token in base units, `10^decimals`
    ///
    /// `None` when the power does not fit in 256 bits (decimals above 77).
    pub fn denominator(&self) -> Option<U256> {
        Self::unit(self.decimals)
    }

    /// `10^decimals` for an arbitrary decimals value reported by a contract
    pub fn unit(decimals: u8) -> Option<U256> {
        U256::from(10u8).checked_pow(U256::from(decimals))
    }

    /// Account one purchase of `value` wei
    ///
    /// `price` is first-touch: it is only written while still zero. Returns
    /// whether the price was set by this call.
    pub fn record_purchase(&mut self, price: U256, value: U256) -> bool {
        let first_price = self.price.is_zero() && !price.is_zero();
        if first_price {
            self.price = price;
        }
        self.total_bought = self.total_bought.saturating_add(value);
        self.times_bought = self.times_bought.saturating_add(1);
        first_price
    }
}

impl Record for Token {
    type Key = Address;

    const BUCKET: Bucket = Bucket::Token;

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
        codec::encode_value(&TokenValue {
            symbol: self.symbol.clone(),
            decimals: self.decimals,
            price: self.price,
            total_bought: self.total_bought,
            times_bought: self.times_bought,
        })
    }

    fn decode_record(address: Address, raw: &[u8]) -> Result<Self, StoreError> {
        let value: TokenValue = codec::decode_value(raw)?;
        Ok(Self {
            address,
            symbol: value.symbol,
            decimals: value.decimals,
            price: value.price,
            total_bought: value.total_bought,
            times_bought: value.times_bought,
        })
    }
}
