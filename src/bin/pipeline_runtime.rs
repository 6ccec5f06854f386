//! Pipeline Runtime
//!
//! This binary wires the CEX flow tracker together:
//! - Opens the aggregation store and applies the schema
//! - Optionally seeds the exchange set from a JSON file
//! - Connects to an Ethereum node over WebSocket
//! - Spawns the block streamer and the ingestion task
//! - Exits with an error if a block cannot be committed, leaving the cursor
//!   on the last committed block
//!
//! Usage:
//!   cargo run --release --bin pipeline_runtime
//!
//! Environment variables:
//!   ETH_RPC_URL - WebSocket endpoint (required)
//!   RUST_LOG - Log filter (default: info)
//!   CEXFLOW_DB_PATH - SQLite database path (default: cexflow.db)
//!   MIN_TRANSFER_WEI - Smallest tracked exchange transfer (default: 1 ETH)
//!   EXCHANGES_SEED_PATH - Exchange JSON to upsert at startup (optional)

use cexflow::pipeline::{
    classifier::ExchangeSet, config::PipelineConfig, engine::Coordinator,
    ingestion::start_pipeline_ingestion,
};
use cexflow::seed::{load_exchanges_file, seed_exchanges};
use cexflow::store::Store;
use cexflow::streamer_core::{
    rpc_client::EthersChainReader, BlockBatch, BlockStreamer, RuntimeConfig, StreamerSettings,
};
use dotenv::dotenv;
use log::{error, info, warn};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// Blocks in flight between streamer and coordinator
const BATCH_CHANNEL_BUFFER: usize = 1;

/// Reconnect attempts the WebSocket transport makes on its own
const TRANSPORT_RECONNECTS: usize = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    let runtime_config = RuntimeConfig::from_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&runtime_config.rust_log),
    )
    .target(env_logger::Target::Stderr)
    .init();

    info!("🚀 CEX Flow Pipeline Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::from_env();

    info!("✅ Configuration loaded");
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Min transfer: {} wei", config.min_transfer_wei);
    match config.price_fee_bps {
        Some(bps) => info!("   ├─ Price fee: {} bps", bps),
        None => info!("   ├─ Price fee: none"),
    }
    info!(
        "   ├─ Backfill: {} (max {} blocks)",
        runtime_config.enable_backfill, runtime_config.max_backfill_blocks
    );
    info!("   └─ Log level: {}", runtime_config.rust_log);

    info!("🔧 Initializing database...");
    let mut store = Store::open(&config.db_path)?;

    if let Some(path) = &config.exchanges_seed_path {
        let exchanges = load_exchanges_file(path)?;
        seed_exchanges(&mut store, &exchanges)?;
    }

    let exchanges = ExchangeSet::load(store.connection())?;
    if exchanges.is_empty() {
        warn!("⚠️  No exchanges in the store; run seed_exchanges or set EXCHANGES_SEED_PATH");
    }
    info!("✅ {} exchange addresses loaded", exchanges.len());

    let chain = Arc::new(
        EthersChainReader::connect(
            &runtime_config.rpc_url,
            runtime_config.block_fetch_timeout,
            TRANSPORT_RECONNECTS,
        )
        .await?,
    );

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(Mutex::new(store)),
        chain.clone(),
        Arc::new(exchanges),
        config.engine_settings(),
    ));

    let resume_from = match coordinator.last_processed()? {
        Some(cursor) => {
            info!("📍 Last processed block: {} ({:?})", cursor.number, cursor.hash);
            Some(cursor.number + 1)
        }
        None => None,
    };

    let (tx, rx) = mpsc::channel::<BlockBatch>(BATCH_CHANNEL_BUFFER);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    info!("🚀 Spawning background tasks...");

    let mut ingestion = tokio::spawn(start_pipeline_ingestion(rx, coordinator.clone()));
    info!("   ├─ ✅ Ingestion task spawned");

    let streamer = BlockStreamer::new(
        chain,
        tx,
        StreamerSettings::from(&runtime_config),
        resume_from,
    );
    let mut streamer = tokio::spawn(streamer.run(async move {
        let _ = shutdown_rx.await;
    }));
    info!("   └─ ✅ Block streamer spawned");

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let mut streamer_done = None;
    let mut ingestion_done = None;
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("⚠️  Received CTRL+C, shutting down..."),
                Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
            }
        }
        result = &mut streamer => streamer_done = Some(result),
        result = &mut ingestion => ingestion_done = Some(result),
    }

    // Stopping the streamer drops the only sender; ingestion drains and exits
    let _ = shutdown_tx.send(());
    let streamer_result = match streamer_done {
        Some(result) => result,
        None => streamer.await,
    };
    let ingestion_result = match ingestion_done {
        Some(result) => result,
        None => ingestion.await,
    };

    let mut exit_error = None;
    match ingestion_result {
        Ok(Ok(stats)) => info!(
            "📊 Ingestion: {} blocks | {} transfers | {} swaps | {} skipped",
            stats.batches, stats.transfers, stats.swaps, stats.skipped
        ),
        Ok(Err(halted)) => {
            error!("❌ Ingestion halted: {}", halted);
            error!("   └─ Restart resumes from block {}", halted.block);
            exit_error = Some(halted.to_string());
        }
        Err(e) => {
            error!("❌ Ingestion task panicked: {}", e);
            exit_error = Some(e.to_string());
        }
    }

    match streamer_result {
        Ok(Ok(stats)) => info!(
            "📊 Streamer: {} headers | {} handed off | {} backfilled | {} dropped | {} resubscriptions",
            stats.headers, stats.handed_off, stats.backfilled, stats.dropped, stats.resubscriptions
        ),
        // Secondary to an ingestion halt, which closes the channel
        Ok(Err(e)) if exit_error.is_some() => warn!("⚠️  Block streamer stopped: {}", e),
        Ok(Err(e)) => {
            error!("❌ Block streamer failed: {}", e);
            exit_error = Some(e.to_string());
        }
        Err(e) => {
            error!("❌ Block streamer task panicked: {}", e);
            exit_error = Some(e.to_string());
        }
    }

    if let Ok(Some(cursor)) = coordinator.last_processed() {
        info!("📍 Stopped at block {}", cursor.number);
    }

    match exit_error {
        Some(e) => Err(e.into()),
        None => {
            info!("✅ Pipeline runtime stopped");
            Ok(())
        }
    }
}
