//! Batch accumulation and bulk flushing into storage.
//!
//! [`BatchWriter`] owns the consumer half of the backpressure queue and
//! the only write path to persistent storage. A flush fires when the batch
//! reaches the size threshold or when the flush timer elapses, whichever
//! comes first, bounding both per-insert overhead and write latency.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::health::{HealthEvent, HealthTracker};
use crate::ohlc::OhlcRecord;
use crate::queue::QueueReceiver;
use crate::store::OhlcStore;

/// Flush thresholds and retry bounds.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Flush as soon as the batch holds this many records.
    pub max_batch_size: usize,
    /// Flush a non-empty batch when this much time has passed since the
    /// last flush.
    pub flush_interval: Duration,
    /// Bulk-insert attempts per flush before giving up.
    pub max_flush_attempts: u32,
    /// Initial retry delay, doubled after each failed attempt.
    pub retry_backoff: Duration,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 1000,
            flush_interval: Duration::from_secs(5),
            max_flush_attempts: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Consumes the queue, accumulates bounded batches, and bulk-upserts them.
pub struct BatchWriter<S> {
    rx: QueueReceiver,
    store: S,
    config: WriterConfig,
    health: Arc<HealthTracker>,
    batch: Vec<OhlcRecord>,
}

impl<S: OhlcStore> BatchWriter<S> {
    #[must_use]
    pub fn new(
        rx: QueueReceiver,
        store: S,
        config: WriterConfig,
        health: Arc<HealthTracker>,
    ) -> Self {
        let batch = Vec::with_capacity(config.max_batch_size);
        Self {
            rx,
            store,
            config,
            health,
            batch,
        }
    }

    /// Runs the writer loop until the queue closes or storage becomes
    /// unrecoverable.
    ///
    /// On queue closure the remaining buffered records are drained and the
    /// final batch is flushed before returning, so graceful shutdown never
    /// loses accepted data.
    ///
    /// # Errors
    ///
    /// Returns [`KrillError::StorageExhausted`](crate::KrillError::StorageExhausted)
    /// once a flush has failed [`WriterConfig::max_flush_attempts`] times.
    pub async fn run(mut self) -> crate::Result<()> {
        let mut timer = tokio::time::interval_at(
            Instant::now() + self.config.flush_interval,
            self.config.flush_interval,
        );
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(record) => {
                        self.batch.push(record);
                        if self.batch.len() >= self.config.max_batch_size {
                            self.flush().await?;
                            timer.reset();
                        }
                    }
                    None => {
                        if !self.batch.is_empty() {
                            self.flush().await?;
                        }
                        info!(
                            records_stored = self.health.records_stored(),
                            "queue closed, batch writer exiting"
                        );
                        return Ok(());
                    }
                },
                _ = timer.tick() => {
                    if !self.batch.is_empty() {
                        self.flush().await?;
                    }
                }
            }
        }
    }

    /// Bulk-upserts the current batch, retrying with exponential backoff.
    ///
    /// The batch is cleared only on success; a failed attempt leaves it
    /// intact for the next try (at-least-once toward storage, with the
    /// identity-key upsert as the idempotence backstop).
    async fn flush(&mut self) -> crate::Result<()> {
        let mut backoff = self.config.retry_backoff;
        let mut last_error = String::new();

        for attempt in 1..=self.config.max_flush_attempts {
            match self.store.upsert_batch(&self.batch).await {
                Ok(written) => {
                    debug!(records = written, "flushed batch");
                    self.health
                        .record(HealthEvent::FlushSucceeded { records: written });
                    self.batch.clear();
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        attempt,
                        max_attempts = self.config.max_flush_attempts,
                        records = self.batch.len(),
                        error = %e,
                        "batch flush failed"
                    );
                    self.health.record(HealthEvent::FlushFailed);
                    last_error = e.to_string();
                    if attempt < self.config.max_flush_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }

        self.health.record(HealthEvent::StorageUnrecoverable);
        error!(
            attempts = self.config.max_flush_attempts,
            records_abandoned = self.batch.len(),
            "storage unrecoverable, abandoning batch and shutting down"
        );
        Err(crate::KrillError::StorageExhausted {
            attempts: self.config.max_flush_attempts,
            last: last_error,
        })
    }
}
