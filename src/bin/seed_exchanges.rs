//! Seed the exchange bucket
//!
//! Usage:
//!   cargo run --bin seed_exchanges -- [path/to/exchanges.json]
//!
//! The path falls back to EXCHANGES_SEED_PATH, then data/exchanges.json.
//! Existing entries are overwritten; entries missing from the file are kept.

use cexflow::pipeline::config::PipelineConfig;
use cexflow::seed::{load_exchanges_file, seed_exchanges};
use cexflow::store::{all, Exchange, Store};
use dotenv::dotenv;
use log::info;
use std::env;

const DEFAULT_SEED_PATH: &str = "data/exchanges.json";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::init();

    let config = PipelineConfig::from_env();
    let path = env::args()
        .nth(1)
        .or_else(|| config.exchanges_seed_path.clone())
        .unwrap_or_else(|| DEFAULT_SEED_PATH.to_string());

    info!("🏦 Seeding exchanges");
    info!("   ├─ Source: {}", path);
    info!("   └─ Database: {}", config.db_path);

    let exchanges = load_exchanges_file(&path)?;
    let mut store = Store::open(&config.db_path)?;
    seed_exchanges(&mut store, &exchanges)?;

    let stored = all::<Exchange>(store.connection())?;
    info!("✅ {} exchanges now stored", stored.len());
    for exchange in stored {
        info!("   ├─ {:?} {}", exchange.address, exchange.name);
    }
    Ok(())
}
