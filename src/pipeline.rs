//! Task assembly and shutdown orchestration.
//!
//! Two tasks do the work: the connection manager owns the exchange session
//! and the dedup filter, the batch writer owns the batch and the storage
//! handle. The bounded queue between them is the only shared-mutable
//! boundary besides the health tracker's counters.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::config::AppConfig;
use crate::dedup::RecentKeyFilter;
use crate::health::{HealthThresholds, HealthTracker};
use crate::queue;
use crate::store::OhlcStore;
use crate::websocket::ConnectionManager;
use crate::writer::{BatchWriter, WriterConfig};

/// How often the health snapshot is logged for external observation.
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the ingestion pipeline until shutdown is requested or storage
/// becomes unrecoverable.
///
/// Graceful shutdown sequence: the adapter closes its subscription and
/// socket, dropping the queue producer; the writer drains the queue and
/// flushes the final batch; only then does this function return. A fatal
/// writer error triggers the same adapter stop path before the error is
/// surfaced — nothing is left running half-alive.
///
/// # Errors
///
/// Returns [`KrillError::StorageExhausted`](crate::KrillError::StorageExhausted)
/// if a batch flush exhausts its retries.
pub async fn run<S>(
    config: &AppConfig,
    store: S,
    mut shutdown: watch::Receiver<bool>,
) -> crate::Result<()>
where
    S: OhlcStore + Send + Sync + 'static,
{
    let (tx, rx) = queue::bounded(config.queue_capacity, config.overflow_policy);

    let health = Arc::new(HealthTracker::new(
        HealthThresholds {
            staleness: config.kraken.staleness_timeout,
            ..HealthThresholds::default()
        },
        tx.depth_gauge(),
        config.queue_capacity,
    ));

    let (stop_tx, stop_rx) = watch::channel(false);
    let adapter = ConnectionManager::new(
        config.kraken.clone(),
        tx,
        RecentKeyFilter::new(config.dedup_capacity),
        health.clone(),
        stop_rx,
    );
    let writer = BatchWriter::new(
        rx,
        store,
        WriterConfig {
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval,
            ..WriterConfig::default()
        },
        health.clone(),
    );

    let adapter_handle = tokio::spawn(adapter.run());
    let mut writer_handle = tokio::spawn(writer.run());
    let health_log = tokio::spawn(health_log_loop(health));

    tokio::select! {
        _ = async {
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
        } => {
            info!("Shutdown requested, draining pipeline");
        }
        result = &mut writer_handle => {
            // The writer only exits on its own when storage is gone.
            let _ = stop_tx.send(true);
            let _ = adapter_handle.await;
            health_log.abort();
            return result.expect("batch writer task panicked");
        }
    }

    let _ = stop_tx.send(true);
    // Adapter exit drops the queue producer, which lets the writer drain.
    let _ = adapter_handle.await;
    let result = writer_handle.await.expect("batch writer task panicked");
    health_log.abort();

    result
}

/// Periodically logs the health snapshot so degradation is observable
/// without a metrics endpoint.
async fn health_log_loop(health: Arc<HealthTracker>) {
    let mut timer = tokio::time::interval(HEALTH_LOG_INTERVAL);
    timer.tick().await; // the first tick is immediate, skip it

    loop {
        timer.tick().await;
        let snapshot = health.snapshot();
        info!(
            connected = snapshot.connected,
            healthy = snapshot.healthy,
            queue_depth = snapshot.queue_depth,
            reconnect_count = snapshot.reconnect_count,
            error_rate = snapshot.error_rate,
            uptime_seconds = snapshot.uptime_seconds,
            records_stored = health.records_stored(),
            messages_total = health.messages_total(),
            "Pipeline health"
        );
    }
}
