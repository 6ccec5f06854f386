//! Pipeline configuration from environment variables

use super::engine::EngineSettings;
use super::price::FeeMultiplier;
use ethers::types::U256;
use std::env;

/// Configuration for the aggregation side of the runtime
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Path to the SQLite aggregation store
    pub db_path: String,

    /// Minimum transfer value in wei (default 1 ETH)
    pub min_transfer_wei: U256,

    /// Fee multiplier in basis points for live prices; `None` applies no fee
    pub price_fee_bps: Option<u32>,

    /// JSON file of `{name, address}` exchanges to upsert at startup
    pub exchanges_seed_path: Option<String>,
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - `CEXFLOW_DB_PATH` (default: cexflow.db)
    /// - `MIN_TRANSFER_WEI` (default: 1000000000000000000)
    /// - `PRICE_FEE_BPS` (default: unset)
    /// - `EXCHANGES_SEED_PATH` (default: unset)
    pub fn from_env() -> Self {
        let min_transfer_wei = match env::var("MIN_TRANSFER_WEI") {
            Ok(raw) => U256::from_dec_str(raw.trim()).unwrap_or_else(|_| {
                log::warn!("Invalid MIN_TRANSFER_WEI '{}', defaulting to 1 ETH", raw);
                U256::exp10(18)
            }),
            Err(_) => U256::exp10(18),
        };

        let price_fee_bps = env::var("PRICE_FEE_BPS").ok().and_then(|raw| {
            match raw.trim().parse::<u32>() {
                Ok(bps) if bps <= 10_000 => Some(bps),
                _ => {
                    log::warn!("Invalid PRICE_FEE_BPS '{}', applying no fee", raw);
                    None
                }
            }
        });

        Self {
            db_path: env::var("CEXFLOW_DB_PATH").unwrap_or_else(|_| "cexflow.db".to_string()),
            min_transfer_wei,
            price_fee_bps,
            exchanges_seed_path: env::var("EXCHANGES_SEED_PATH")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            min_transfer_wei: self.min_transfer_wei,
            fee: self.price_fee_bps.map(FeeMultiplier::from_bps),
        }
    }
}
