//! Block streamer - producer side of the pipeline
//!
//! Subscribes to new heads, fetches each block with a bounded timeout and
//! hands the transactions to the consumer over a single-slot channel.
//!
//! Heights are handed off strictly in order. With backfill enabled a block
//! that could not be fetched is not lost: the next header re-requests every
//! height between the last handed-off block and the new tip (capped by
//! `max_backfill_blocks`). Without backfill a failed block is dropped.
//!
//! A dropped or failed subscription is retried with exponential backoff;
//! only an exhausted retry budget stops the streamer.

use super::chain::{BlockBatch, BlockHeader, ChainError, ChainReader};
use super::config::RuntimeConfig;
use super::error_handler::ExponentialBackoff;
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct StreamerSettings {
    pub fetch_timeout: Duration,
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    pub reconnect_max_retries: u32,
    pub enable_backfill: bool,
    pub max_backfill_blocks: u64,
}

impl From<&RuntimeConfig> for StreamerSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            fetch_timeout: config.block_fetch_timeout,
            reconnect_initial_delay: Duration::from_secs(config.reconnect_initial_delay_secs),
            reconnect_max_delay: Duration::from_secs(config.reconnect_max_delay_secs),
            reconnect_max_retries: config.reconnect_max_retries,
            enable_backfill: config.enable_backfill,
            max_backfill_blocks: config.max_backfill_blocks,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StreamerError {
    #[error("header subscription lost after {0} reconnect attempts")]
    SubscriptionLost(u32),

    #[error("block consumer closed")]
    ConsumerClosed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StreamStats {
    pub headers: u64,
    pub handed_off: u64,
    pub backfilled: u64,
    pub dropped: u64,
    pub resubscriptions: u64,
}

pub struct BlockStreamer<C: ChainReader + ?Sized> {
    chain: Arc<C>,
    tx: mpsc::Sender<BlockBatch>,
    settings: StreamerSettings,
    /// Next height to hand off; `None` until the first header (or cursor)
    next_block: Option<u64>,
    stats: StreamStats,
}

impl<C: ChainReader + ?Sized> BlockStreamer<C> {
    /// `resume_from` is the first height not yet committed, usually the
    /// stored cursor + 1
    pub fn new(
        chain: Arc<C>,
        tx: mpsc::Sender<BlockBatch>,
        settings: StreamerSettings,
        resume_from: Option<u64>,
    ) -> Self {
        Self {
            chain,
            tx,
            settings,
            next_block: resume_from,
            stats: StreamStats::default(),
        }
    }

    /// Run until `shutdown` resolves or the subscription cannot be restored
    pub async fn run<S>(mut self, shutdown: S) -> Result<StreamStats, StreamerError>
    where
        S: Future<Output = ()>,
    {
        log::info!("🚀 Starting block streamer");
        log::info!("   ├─ Fetch timeout: {:?}", self.settings.fetch_timeout);
        match self.next_block {
            Some(n) => log::info!("   ├─ Resuming from block {}", n),
            None => log::info!("   ├─ No cursor, starting at the next header"),
        }
        log::info!(
            "   └─ Backfill: {} (max {} blocks)",
            self.settings.enable_backfill,
            self.settings.max_backfill_blocks
        );

        let mut backoff = ExponentialBackoff::from_durations(
            self.settings.reconnect_initial_delay,
            self.settings.reconnect_max_delay,
            self.settings.reconnect_max_retries,
        );
        tokio::pin!(shutdown);

        'outer: loop {
            let subscribed = tokio::select! {
                _ = &mut shutdown => break 'outer,
                res = self.chain.subscribe_new_headers() => res,
            };

            match subscribed {
                Ok(mut headers) => {
                    log::info!("✅ Subscribed to new heads");
                    loop {
                        tokio::select! {
                            _ = &mut shutdown => break 'outer,
                            next = headers.next() => match next {
                                Some(header) => {
                                    backoff.reset();
                                    self.on_header(header).await?;
                                }
                                None => {
                                    log::warn!("⚠️  Header stream ended, resubscribing");
                                    break;
                                }
                            },
                        }
                    }
                }
                Err(e) => log::error!("❌ Header subscription failed: {}", e),
            }

            tokio::select! {
                _ = &mut shutdown => break 'outer,
                res = backoff.sleep() => {
                    if let Err(e) = res {
                        log::error!("❌ Giving up on header subscription: {}", e);
                        return Err(StreamerError::SubscriptionLost(e.0));
                    }
                }
            }
            self.stats.resubscriptions += 1;
        }

        log::info!(
            "✅ Block streamer stopped ({} headers, {} blocks handed off, {} backfilled, {} dropped)",
            self.stats.headers,
            self.stats.handed_off,
            self.stats.backfilled,
            self.stats.dropped
        );
        Ok(self.stats)
    }

    async fn on_header(&mut self, header: BlockHeader) -> Result<(), StreamerError> {
        self.stats.headers += 1;
        let next = *self.next_block.get_or_insert(header.number);

        if header.number < next {
            log::debug!(
                "⏭️  Header {} already handed off (next {}), skipping",
                header.number,
                next
            );
            return Ok(());
        }

        if self.settings.enable_backfill && header.number > next {
            let gap = header.number - next;
            let start = if gap > self.settings.max_backfill_blocks {
                let start = header.number - self.settings.max_backfill_blocks;
                log::warn!(
                    "⚠️  Gap of {} blocks exceeds backfill limit, skipping {}..{}",
                    gap,
                    next,
                    start
                );
                self.stats.dropped += start - next;
                start
            } else {
                next
            };

            for number in start..header.number {
                match self.fetch(self.chain.block_by_number(number)).await {
                    Ok(batch) => {
                        log::info!("🔁 Backfilled block {}", number);
                        self.stats.backfilled += 1;
                        self.hand_off(batch).await?;
                    }
                    Err(e) => {
                        log::warn!(
                            "⚠️  Backfill of block {} failed: {} (retrying on next header)",
                            number,
                            e
                        );
                        return Ok(());
                    }
                }
            }
        }

        match self.fetch(self.chain.block_by_hash(header.hash)).await {
            Ok(batch) => self.hand_off(batch).await,
            Err(e) if self.settings.enable_backfill => {
                log::warn!("⚠️  Block {} deferred: {}", header.number, e);
                Ok(())
            }
            Err(e) => {
                log::warn!("⚠️  Block {} dropped: {}", header.number, e);
                self.stats.dropped += 1;
                self.next_block = Some(header.number + 1);
                Ok(())
            }
        }
    }

    async fn fetch<F>(&self, request: F) -> Result<BlockBatch, ChainError>
    where
        F: Future<Output = Result<BlockBatch, ChainError>>,
    {
        tokio::time::timeout(self.settings.fetch_timeout, request)
            .await
            .map_err(|_| ChainError::Timeout(self.settings.fetch_timeout))?
    }

    /// Blocks until the consumer has room for the batch
    async fn hand_off(&mut self, batch: BlockBatch) -> Result<(), StreamerError> {
        let number = batch.number;
        self.tx
            .send(batch)
            .await
            .map_err(|_| StreamerError::ConsumerClosed)?;
        self.next_block = Some(number + 1);
        self.stats.handed_off += 1;
        Ok(())
    }
}
