//! Block ingestion loop.
//!
//! Keeps the cache tip in step with the node. Each step requests the block
//! at the cache's next height and does one of:
//!
//! | outcome                  | action                              |
//! |--------------------------|-------------------------------------|
//! | node has no block yet    | sleep the poll interval             |
//! | RPC or decode error      | sleep `base + step * retry`         |
//! | prev hash does not link  | roll the cache back and retry lower |
//! | block links              | append and advance                  |
//!
//! Exceeding the retry or reorg ceiling ends the loop with an error. A
//! run of rollbacks counts against the ceiling until ingestion passes the
//! height where it began, so a chain that never links is fatal.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use lwd_core::error::IngestError;
use lwd_core::hash::BlockHasher;
use lwd_core::traits::BlockCache;
use lwd_core::types::Hash256;

use crate::clock::Sleeper;
use crate::fetch::fetch_compact_block;
use crate::mirror::MirrorFanout;
use crate::node_client::NodeRpc;

#[derive(Debug, Clone)]
pub struct IngestorConfig {
    /// Pause while the node has no block at the next height.
    pub poll_interval: Duration,
    /// Base pause after a fetch error.
    pub retry_base: Duration,
    /// Added to the pause for each consecutive error.
    pub retry_step: Duration,
    pub max_retries: u32,
    /// Consecutive rollbacks allowed before giving up.
    pub max_reorg: u32,
    /// Blocks dropped per rollback.
    pub reorg_backoff: u64,
    pub reorg_pause: Duration,
    /// Reject blocks whose coinbase height differs from the requested one.
    pub strict_height: bool,
    /// Minimum spacing of "adding block" log lines.
    pub progress_log_interval: Duration,
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            retry_base: Duration::from_secs(10),
            retry_step: Duration::from_secs(5),
            max_retries: 10,
            max_reorg: 100,
            reorg_backoff: 1,
            reorg_pause: Duration::from_secs(1),
            strict_height: false,
            progress_log_interval: Duration::from_secs(4),
        }
    }
}

/// What one ingestion step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStep {
    Added(u64),
    Waiting(u64),
    Retried { height: u64, retry: u32 },
    Reorged { from: u64, to: u64 },
}

pub struct Ingestor {
    cache: Arc<dyn BlockCache>,
    rpc: Arc<dyn NodeRpc>,
    hasher: Arc<dyn BlockHasher>,
    sleeper: Arc<dyn Sleeper>,
    mirrors: Option<MirrorFanout>,
    config: IngestorConfig,
    retry_count: u32,
    reorg_count: u32,
    /// Height of the first mismatch in the current run of rollbacks.
    reorg_from: Option<u64>,
    last_progress_log: Option<Instant>,
    last_waiting_logged: Option<u64>,
}

impl Ingestor {
    pub fn new(
        cache: Arc<dyn BlockCache>,
        rpc: Arc<dyn NodeRpc>,
        hasher: Arc<dyn BlockHasher>,
        sleeper: Arc<dyn Sleeper>,
        config: IngestorConfig,
    ) -> Self {
        Self {
            cache,
            rpc,
            hasher,
            sleeper,
            mirrors: None,
            config,
            retry_count: 0,
            reorg_count: 0,
            reorg_from: None,
            last_progress_log: None,
            last_waiting_logged: None,
        }
    }

    /// Copy every append and rollback to `mirrors`.
    pub fn with_mirrors(mut self, mirrors: MirrorFanout) -> Self {
        self.mirrors = Some(mirrors);
        self
    }

    /// Run `repetitions` steps, or forever when `None`. Returns early only
    /// on a fatal error.
    pub async fn run(&mut self, repetitions: Option<u64>) -> Result<(), IngestError> {
        info!(next = self.cache.next_height(), "starting block ingestor");
        let mut done = 0u64;
        while repetitions.is_none_or(|n| done < n) {
            self.step().await?;
            done += 1;
        }
        Ok(())
    }

    pub async fn step(&mut self) -> Result<IngestStep, IngestError> {
        let height = self.cache.next_height();
        let fetched = fetch_compact_block(
            self.rpc.as_ref(),
            self.hasher.as_ref(),
            height,
            self.config.strict_height,
        )
        .await;

        let block = match fetched {
            Err(e) => {
                self.retry_count += 1;
                warn!(height, retry = self.retry_count, "error fetching block: {e}");
                if self.retry_count > self.config.max_retries {
                    return Err(IngestError::RetriesExhausted {
                        method: "getblock",
                        retries: self.config.max_retries,
                    });
                }
                let delay = self.config.retry_base + self.config.retry_step * self.retry_count;
                self.pause(delay).await;
                return Ok(IngestStep::Retried { height, retry: self.retry_count });
            }
            Ok(None) => {
                self.retry_count = 0;
                if self.last_waiting_logged != Some(height) {
                    info!(height, "ingestor waiting for block");
                    self.last_waiting_logged = Some(height);
                }
                self.pause(self.config.poll_interval).await;
                return Ok(IngestStep::Waiting(height));
            }
            Ok(Some(block)) => block,
        };
        self.retry_count = 0;

        let prev_hash = block.prev_block_hash().unwrap_or(Hash256::ZERO);
        if self.cache.hash_mismatch(&prev_hash) {
            self.reorg_count += 1;
            let from = *self.reorg_from.get_or_insert(height);
            if self.reorg_count > self.config.max_reorg {
                return Err(IngestError::ReorgLimit(self.config.max_reorg));
            }
            warn!(
                height,
                hash = ?block.block_hash().map(|h| h.to_string()),
                phash = ?self.cache.latest_hash().map(|h| h.to_string()),
                reorg = self.reorg_count,
                from,
                "reorg"
            );
            let target = height.saturating_sub(self.config.reorg_backoff);
            let to = self.cache.reorg(target)?;
            if to > target {
                warn!(height, to, "reorg clamped at the first cached block");
            }
            if let Some(mirrors) = &self.mirrors {
                mirrors.notify_reorg(to);
            }
            self.sleeper.sleep(self.config.reorg_pause).await;
            return Ok(IngestStep::Reorged { from: height, to });
        }

        // Re-adding heights that were just rolled back does not end the
        // reorg; only passing the height where it started does.
        if self.reorg_from.is_none_or(|from| height >= from) {
            self.reorg_count = 0;
            self.reorg_from = None;
        }
        self.cache.add(&block)?;
        if let Some(mirrors) = &self.mirrors {
            mirrors.notify_add(&block);
        }
        self.log_progress(height, block.block_hash());
        Ok(IngestStep::Added(height))
    }

    async fn pause(&self, duration: Duration) {
        if let Err(e) = self.cache.sync() {
            warn!("cache sync failed: {e}");
        }
        self.sleeper.sleep(duration).await;
    }

    fn log_progress(&mut self, height: u64, hash: Option<Hash256>) {
        let now = Instant::now();
        let due = self
            .last_progress_log
            .is_none_or(|last| now.duration_since(last) >= self.config.progress_log_interval);
        if due {
            self.last_progress_log = Some(now);
            info!(height, hash = ?hash.map(|h| h.to_string()), "ingestor adding block");
        } else {
            debug!(height, "ingestor adding block");
        }
    }
}
