pub mod block_streamer;
pub mod chain;
pub mod config;
pub mod error_handler;
pub mod rpc_client;

#[cfg(test)]
pub(crate) mod mock_chain;

pub use block_streamer::{BlockStreamer, StreamStats, StreamerError, StreamerSettings};
pub use chain::{
    BlockBatch, BlockHeader, ChainError, ChainReader, ChainTransaction, HeaderStream,
    PairReserves, TokenMetadata,
};
pub use config::{ConfigError, RuntimeConfig};
pub use error_handler::{ExponentialBackoff, MaxRetriesExceeded};
pub use rpc_client::EthersChainReader;
