//! Chain Reader capability
//!
//! Everything the pipeline needs from an Ethereum node, behind one trait so
//! the producer and the engine can run against a scripted chain in tests.

use async_trait::async_trait;
use ethers::types::{Address, Block, Bytes, Transaction, H256, U256};
use futures::stream::BoxStream;

/// A new-head notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: H256,
}

/// The subset of a transaction the classifier looks at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    pub hash: H256,
    pub from: Address,
    /// `None` for contract creation
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
}

impl From<Transaction> for ChainTransaction {
    fn from(tx: Transaction) -> Self {
        Self {
            hash: tx.hash,
            from: tx.from,
            to: tx.to,
            value: tx.value,
            input: tx.input,
        }
    }
}

/// All transactions of one block, handed from producer to consumer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockBatch {
    pub number: u64,
    pub hash: H256,
    pub transactions: Vec<ChainTransaction>,
}

impl BlockBatch {
    pub fn header(&self) -> BlockHeader {
        BlockHeader {
            number: self.number,
            hash: self.hash,
        }
    }

    /// Convert a full block; pending blocks (no number or hash) are rejected
    pub fn from_block(block: Block<Transaction>) -> Result<Self, ChainError> {
        let number = block
            .number
            .ok_or_else(|| ChainError::BlockNotFound("pending block has no number".into()))?
            .as_u64();
        let hash = block
            .hash
            .ok_or_else(|| ChainError::BlockNotFound(format!("block {} has no hash", number)))?;
        Ok(Self {
            number,
            hash,
            transactions: block.transactions.into_iter().map(Into::into).collect(),
        })
    }
}

/// Raw `getReserves()` of a pair, in the pair's own token0/token1 order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PairReserves {
    pub reserve0: U256,
    pub reserve1: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("contract call failed: {0}")]
    Contract(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("block not found: {0}")]
    BlockNotFound(String),

    #[error("header subscription closed")]
    SubscriptionClosed,

    #[error("no pair for {0:?}/{1:?}")]
    PairNotFound(Address, Address),
}

pub type HeaderStream = BoxStream<'static, BlockHeader>;

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Subscribe to new heads; the stream ends when the subscription drops
    async fn subscribe_new_headers(&self) -> Result<HeaderStream, ChainError>;

    async fn block_by_hash(&self, hash: H256) -> Result<BlockBatch, ChainError>;

    /// Used by backfill to fetch heights no header was seen for
    async fn block_by_number(&self, number: u64) -> Result<BlockBatch, ChainError>;

    /// Reserves of the `token_a`/`token_b` pair created by `factory`
    async fn reserves_for_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairReserves, ChainError>;

    async fn factory_for_router(&self, router: Address) -> Result<Address, ChainError>;

    async fn erc20_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError>;
}
