use super::codec::{self, decode_address};
use super::record::{all, all_as_map, Record};
use super::token::Token;
use super::{Bucket, StoreError};
use ethers::types::{Address, U256};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

/// Composite `(token, exchange)` key
///
/// Encoded as the 20 token bytes followed by the UTF-8 exchange name. The
/// token part is fixed width, so the split is unambiguous and the same
/// logical pair always yields the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PatternKey {
    pub token: Address,
    pub exchange: String,
}

impl PatternKey {
    pub fn new(token: Address, exchange: impl Into<String>) -> Self {
        Self {
            token,
            exchange: exchange.into(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(20 + self.exchange.len());
        out.extend_from_slice(self.token.as_bytes());
        out.extend_from_slice(self.exchange.as_bytes());
        out
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self, StoreError> {
        if raw.len() < 20 {
            return Err(StoreError::InvalidKey {
                bucket: Bucket::Pattern,
                reason: format!("composite key too short ({} bytes)", raw.len()),
            });
        }
        let token = decode_address(Bucket::Pattern, &raw[..20])?;
        let exchange =
            String::from_utf8(raw[20..].to_vec()).map_err(|e| StoreError::InvalidKey {
                bucket: Bucket::Pattern,
                reason: format!("exchange name is not UTF-8: {}", e),
            })?;
        Ok(Self { token, exchange })
    }
}

/// "Wallets funded by `exchange` went on to buy `token`"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub token: Address,
    pub exchange: String,
    pub value: U256,
    pub times_occurred: u64,
}

#[derive(Serialize, Deserialize)]
struct PatternValue {
    #[serde(with = "codec::uint_bytes")]
    value: U256,
    times_occurred: u64,
}

/// A pattern joined with the metadata of its token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternReport {
    pub pattern: Pattern,
    pub symbol: String,
    pub decimals: u8,
    pub price: U256,
}

impl Pattern {
    pub fn new(token: Address, exchange: impl Into<String>) -> Self {
        Self {
            token,
            exchange: exchange.into(),
            value: U256::zero(),
            times_occurred: 0,
        }
    }

    pub fn record(&mut self, value: U256) {
        self.value = self.value.saturating_add(value);
        self.times_occurred = self.times_occurred.saturating_add(1);
    }

    /// Every pattern whose token is known, with that token's metadata
    ///
    /// Patterns referencing a token missing from the Token bucket are skipped.
    pub fn all_with_tokens(conn: &Connection) -> Result<Vec<PatternReport>, StoreError> {
        let tokens = all_as_map::<Token>(conn)?;
        let mut reports: Vec<PatternReport> = all::<Pattern>(conn)?
            .into_iter()
            .filter_map(|pattern| {
                let token = tokens.get(&pattern.token)?;
                Some(PatternReport {
                    symbol: token.symbol.clone(),
                    decimals: token.decimals,
                    price: token.price,
                    pattern,
                })
            })
            .collect();
        reports.sort_by(|a, b| b.pattern.times_occurred.cmp(&a.pattern.times_occurred));
        Ok(reports)
    }
}

impl Record for Pattern {
    type Key = PatternKey;

    const BUCKET: Bucket = Bucket::Pattern;

    fn key(&self) -> PatternKey {
        PatternKey::new(self.token, self.exchange.clone())
    }

    fn encode_key(key: &PatternKey) -> Vec<u8> {
        key.to_bytes()
    }

    fn decode_key(raw: &[u8]) -> Result<PatternKey, StoreError> {
        PatternKey::from_bytes(raw)
    }

    fn encode_value(&self) -> Result<Vec<u8>, StoreError> {
        codec::encode_value(&PatternValue {
            value: self.value,
            times_occurred: self.times_occurred,
        })
    }

    fn decode_record(key: PatternKey, raw: &[u8]) -> Result<Self, StoreError> {
        let value: PatternValue = codec::decode_value(raw)?;
        Ok(Self {
            token: key.token,
            exchange: key.exchange,
            value: value.value,
            times_occurred: value.times_occurred,
        })
    }
}
