//! Pipeline ingestion - consumer side of the block handoff
//!
//! Receives one `BlockBatch` at a time from the block streamer and runs it
//! through the `Coordinator`. The channel has a single slot, so the streamer
//! stalls until the previous batch is committed.
//!
//! A failed commit stops ingestion. Later blocks would move the cursor past
//! the failed height, so the loop exits and the runtime shuts down with the
//! cursor still on the last committed block.

use super::engine::Coordinator;
use crate::store::StoreError;
use crate::streamer_core::chain::{BlockBatch, ChainReader};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// Running totals reported by the ingestion loop
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestionStats {
    pub batches: u64,
    pub transfers: u64,
    pub swaps: u64,
    pub skipped: u64,
}

/// Ingestion stopped on a block that could not be committed
#[derive(Debug, thiserror::Error)]
#[error("block {block} could not be committed: {source}")]
pub struct IngestionHalted {
    pub block: u64,
    pub source: StoreError,
    /// Totals up to the last committed block
    pub stats: IngestionStats,
}

/// Consume batches until the channel closes or a commit fails
pub async fn start_pipeline_ingestion<C>(
    mut rx: mpsc::Receiver<BlockBatch>,
    coordinator: Arc<Coordinator<C>>,
) -> Result<IngestionStats, IngestionHalted>
where
    C: ChainReader + ?Sized,
{
    log::info!("🚀 Starting pipeline ingestion");
    log::info!("   └─ Waiting for blocks...");

    let mut stats = IngestionStats::default();
    let mut last_log_time = Instant::now();
    let mut window_batches = 0u64;

    while let Some(batch) = rx.recv().await {
        let started = Instant::now();
        match coordinator.process_batch(&batch).await {
            Ok(summary) => {
                stats.batches += 1;
                stats.transfers += summary.transfers as u64;
                stats.swaps += summary.swaps as u64;
                stats.skipped += summary.skipped as u64;
                window_batches += 1;

                log::info!(
                    "📦 Block {} committed: {} txs | {} transfers | {} swaps | {} skipped | {}ms",
                    summary.block,
                    summary.transactions,
                    summary.transfers,
                    summary.swaps,
                    summary.skipped,
                    started.elapsed().as_millis()
                );
            }
            Err(e) => {
                log::error!("❌ Block {} not committed, stopping ingestion: {}", batch.number, e);
                return Err(IngestionHalted {
                    block: batch.number,
                    source: e,
                    stats,
                });
            }
        }

        if last_log_time.elapsed().as_secs() >= 60 {
            let per_min = window_batches as f64 * 60.0 / last_log_time.elapsed().as_secs_f64();
            log::info!(
                "📊 Ingestion rate: {:.1} blocks/min (total: {})",
                per_min, stats.batches
            );
            last_log_time = Instant::now();
            window_batches = 0;
        }
    }

    log::warn!("⚠️  Block channel closed, stopping ingestion");
    log::info!(
        "✅ Pipeline ingestion stopped ({} blocks, {} swaps)",
        stats.batches,
        stats.swaps
    );
    Ok(stats)
}
