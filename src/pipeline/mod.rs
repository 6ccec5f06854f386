//! # CEX Flow Pipeline
//!
//! Turns confirmed blocks into persisted wallet, token and pattern state.
//!
//! ## Flow
//!
//! 1. The block streamer hands one [`BlockBatch`](crate::streamer_core::BlockBatch)
//!    at a time over a bounded channel
//! 2. [`classify`] sorts every transaction: a transfer out of a known exchange
//!    address, a swap call from a tracked wallet, or noise
//! 3. Swap calldata is decoded and priced against live pair reserves along
//!    the swap path
//! 4. The [`Coordinator`] applies the whole block in one write transaction,
//!    advancing the block cursor in that same transaction
//!
//! A block either lands completely or not at all. Individual swaps that
//! cannot be decoded or priced are skipped without failing the block.
//!
//! ## Module Organization
//!
//! - `classifier` - Exchange address set and transaction classification
//! - `decoder` - Router calldata decoding
//! - `price` - Reserve orientation and multi-hop pricing
//! - `engine` - Per-block coordinator
//! - `ingestion` - Channel consumer loop
//! - `config` - Environment configuration

pub mod classifier;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod ingestion;
pub mod price;

pub use classifier::{classify, Classification, ExchangeSet, IgnoreReason};
pub use config::PipelineConfig;
pub use decoder::{decode, decode_input, DecodeError, SwapCall, SwapMethod};
pub use engine::{BatchSummary, Coordinator, EngineSettings, SkipReason, TxOutcome};
pub use ingestion::{start_pipeline_ingestion, IngestionHalted, IngestionStats};
pub use price::{
    orient_reserves, path_price, price, reserves_along_path, FeeMultiplier, PriceError, Reserves,
};
