use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub rpc_url: String,
    pub rust_log: String,
    pub block_fetch_timeout: Duration,
    pub reconnect_initial_delay_secs: u64,
    pub reconnect_max_delay_secs: u64,
    pub reconnect_max_retries: u32,
    pub enable_backfill: bool,
    pub max_backfill_blocks: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_url = env::var("ETH_RPC_URL")
            .map_err(|_| ConfigError::MissingVariable("ETH_RPC_URL".to_string()))?;

        if !rpc_url.starts_with("ws://") && !rpc_url.starts_with("wss://") {
            return Err(ConfigError::InvalidValue(
                "ETH_RPC_URL must start with ws:// or wss:// (header subscriptions need a websocket)"
                    .to_string(),
            ));
        }

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let block_fetch_timeout = Duration::from_secs(parse_or("BLOCK_FETCH_TIMEOUT_SECS", 10));
        if block_fetch_timeout.is_zero() {
            return Err(ConfigError::InvalidValue(
                "BLOCK_FETCH_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let reconnect_initial_delay_secs = parse_or("RECONNECT_INITIAL_DELAY_SECS", 2u64);
        let reconnect_max_delay_secs = parse_or("RECONNECT_MAX_DELAY_SECS", 60u64);
        if reconnect_max_delay_secs < reconnect_initial_delay_secs {
            return Err(ConfigError::InvalidValue(format!(
                "RECONNECT_MAX_DELAY_SECS ({}) is below RECONNECT_INITIAL_DELAY_SECS ({})",
                reconnect_max_delay_secs, reconnect_initial_delay_secs
            )));
        }

        let enable_backfill = env::var("ENABLE_BACKFILL")
            .unwrap_or_else(|_| "true".to_string())
            .to_lowercase()
            .parse::<bool>()
            .unwrap_or(true);

        Ok(Self {
            rpc_url,
            rust_log,
            block_fetch_timeout,
            reconnect_initial_delay_secs,
            reconnect_max_delay_secs,
            reconnect_max_retries: parse_or("RECONNECT_MAX_RETRIES", 8u32),
            enable_backfill,
            max_backfill_blocks: parse_or("MAX_BACKFILL_BLOCKS", 64u64),
        })
    }
}
