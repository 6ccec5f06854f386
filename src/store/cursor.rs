use super::codec;
use super::record::{peek, Record};
use super::{Bucket, StoreError};
use ethers::types::H256;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

const CURSOR_KEY: &[u8] = b"last_processed";

/// Last block whose batch was committed
///
/// Written in the same transaction as the batch it describes, so the cursor
/// never runs ahead of the aggregates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockCursor {
    pub number: u64,
    pub hash: H256,
    /// Unix seconds at commit time
    pub updated_at: i64,
}

impl BlockCursor {
    pub fn new(number: u64, hash: H256) -> Self {
        Self {
            number,
            hash,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn load(conn: &Connection) -> Result<Option<Self>, StoreError> {
        match peek::<BlockCursor>(conn, &()) {
            Ok(cursor) => Ok(Some(cursor)),
            Err(StoreError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Record for BlockCursor {
    type Key = ();

    const BUCKET: Bucket = Bucket::Cursor;

    fn key(&self) {}

    fn encode_key(_: &()) -> Vec<u8> {
        CURSOR_KEY.to_vec()
    }

    fn decode_key(raw: &[u8]) -> Result<(), StoreError> {
        if raw != CURSOR_KEY {
            return Err(StoreError::InvalidKey {
                bucket: Self::BUCKET,
                reason: format!("unexpected cursor key 0x{}", hex::encode(raw)),
            });
        }
        Ok(())
    }

    fn encode_value(&self) -> Result<Vec<u8>, StoreError> {
        codec::encode_value(self)
    }

    fn decode_record(_: (), raw: &[u8]) -> Result<Self, StoreError> {
        codec::decode_value(raw)
    }
}
