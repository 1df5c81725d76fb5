//! Connection and storage health aggregation.
//!
//! [`HealthTracker`] is a pure aggregator: the adapter and writer tasks
//! record lifecycle events, and any number of external callers may take a
//! [`HealthSnapshot`] concurrently. Counters are atomics and the error
//! window sits behind a short-lived lock, so neither task contends on the
//! hot ingestion path. Degradation is reported, never acted on here.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Sliding window over which the error rate is computed.
const ERROR_WINDOW: Duration = Duration::from_secs(60);

/// Sentinel for "no message received yet".
const NEVER: i64 = i64::MIN;

/// Lifecycle events recorded by the adapter and writer tasks.
#[derive(Debug, Clone, Copy)]
pub enum HealthEvent {
    Connected,
    Disconnected,
    MessageReceived,
    SubscribeFailed,
    MalformedMessage,
    FlushSucceeded { records: u64 },
    FlushFailed,
    StorageUnrecoverable,
}

/// Degradation thresholds. Conditions are OR'd: any one of them marks the
/// snapshot unhealthy.
#[derive(Debug, Clone)]
pub struct HealthThresholds {
    /// No message for this long counts as stale.
    pub staleness: Duration,
    /// Errors per minute above this ceiling count as degraded.
    pub error_rate_ceiling: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            staleness: Duration::from_secs(90),
            error_rate_ceiling: 10.0,
        }
    }
}

/// Point-in-time health state exposed for external polling.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub connected: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub reconnect_count: u64,
    pub uptime_seconds: f64,
    pub queue_depth: usize,
    /// Errors per minute over the trailing window.
    pub error_rate: f64,
    pub healthy: bool,
}

/// Process-wide health counters spanning the connection lifetime.
///
/// `reconnect_count` persists across reconnects within a process run and
/// resets only on restart.
pub struct HealthTracker {
    started: Instant,
    thresholds: HealthThresholds,
    queue_depth: Arc<AtomicUsize>,
    queue_capacity: usize,
    connected: AtomicBool,
    ever_connected: AtomicBool,
    reconnect_count: AtomicU64,
    messages_total: AtomicU64,
    records_stored: AtomicU64,
    last_message_ms: AtomicI64,
    errors: Mutex<VecDeque<Instant>>,
}

impl HealthTracker {
    /// Creates a tracker observing the given queue depth gauge.
    #[must_use]
    pub fn new(
        thresholds: HealthThresholds,
        queue_depth: Arc<AtomicUsize>,
        queue_capacity: usize,
    ) -> Self {
        Self {
            started: Instant::now(),
            thresholds,
            queue_depth,
            queue_capacity,
            connected: AtomicBool::new(false),
            ever_connected: AtomicBool::new(false),
            reconnect_count: AtomicU64::new(0),
            messages_total: AtomicU64::new(0),
            records_stored: AtomicU64::new(0),
            last_message_ms: AtomicI64::new(NEVER),
            errors: Mutex::new(VecDeque::new()),
        }
    }

    /// Records a lifecycle event. Cheap enough for the per-message path.
    pub fn record(&self, event: HealthEvent) {
        match event {
            HealthEvent::Connected => {
                self.connected.store(true, Ordering::Release);
                if self.ever_connected.swap(true, Ordering::AcqRel) {
                    self.reconnect_count.fetch_add(1, Ordering::Relaxed);
                }
            }
            HealthEvent::Disconnected => {
                self.connected.store(false, Ordering::Release);
                self.record_error();
            }
            HealthEvent::MessageReceived => {
                self.messages_total.fetch_add(1, Ordering::Relaxed);
                self.last_message_ms
                    .store(Utc::now().timestamp_millis(), Ordering::Release);
            }
            HealthEvent::FlushSucceeded { records } => {
                self.records_stored.fetch_add(records, Ordering::Relaxed);
            }
            HealthEvent::SubscribeFailed
            | HealthEvent::MalformedMessage
            | HealthEvent::FlushFailed
            | HealthEvent::StorageUnrecoverable => {
                self.record_error();
            }
        }
    }

    fn record_error(&self) {
        let now = Instant::now();
        let mut errors = self.errors.lock().expect("health mutex poisoned");
        Self::prune(&mut errors, now);
        errors.push_back(now);
    }

    fn prune(errors: &mut VecDeque<Instant>, now: Instant) {
        while let Some(&front) = errors.front() {
            if now.duration_since(front) > ERROR_WINDOW {
                errors.pop_front();
            } else {
                break;
            }
        }
    }

    /// Takes a point-in-time snapshot. Safe to call from any thread
    /// concurrently with both pipeline tasks.
    pub fn snapshot(&self) -> HealthSnapshot {
        let now = Instant::now();
        let uptime = now.duration_since(self.started);

        let error_rate = {
            let mut errors = self.errors.lock().expect("health mutex poisoned");
            Self::prune(&mut errors, now);
            errors.len() as f64 * 60.0 / ERROR_WINDOW.as_secs_f64()
        };

        let last_ms = self.last_message_ms.load(Ordering::Acquire);
        let last_message_at = (last_ms != NEVER)
            .then(|| Utc.timestamp_millis_opt(last_ms).single())
            .flatten();

        let stale = match last_message_at {
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.num_milliseconds() > self.thresholds.staleness.as_millis() as i64
            }
            None => uptime > self.thresholds.staleness,
        };

        let queue_depth = self.queue_depth.load(Ordering::Relaxed);
        let pinned = queue_depth >= self.queue_capacity;
        let degraded = error_rate > self.thresholds.error_rate_ceiling;

        HealthSnapshot {
            connected: self.connected.load(Ordering::Acquire),
            last_message_at,
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
            uptime_seconds: uptime.as_secs_f64(),
            queue_depth,
            error_rate,
            healthy: !(stale || degraded || pinned),
        }
    }

    /// Total records reported stored by the writer.
    #[must_use]
    pub fn records_stored(&self) -> u64 {
        self.records_stored.load(Ordering::Relaxed)
    }

    /// Total messages received from the exchange.
    #[must_use]
    pub fn messages_total(&self) -> u64 {
        self.messages_total.load(Ordering::Relaxed)
    }
}
