//! Bounded single-producer/single-consumer queue between the stream
//! adapter and the batch writer.
//!
//! The queue exists to keep memory bounded when the writer falls behind —
//! burst arrival after a reconnect replay far exceeds the steady storage
//! write rate. Depth never exceeds the configured capacity; on a full
//! queue the configured [`OverflowPolicy`] decides between applying
//! backpressure to the producer and shedding the oldest buffered record.
//! FIFO order is preserved unconditionally.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::warn;

use crate::ohlc::OhlcRecord;

/// What to do with an inbound record when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Suspend the producer until the writer makes room. Risks an
    /// exchange-side disconnect if the stall lasts too long.
    Block,
    /// Evict the oldest buffered record. Sacrifices staleness for
    /// liveness; every eviction is logged as a data-completeness warning.
    DropOldest,
}

/// The receiver was dropped; the record was not enqueued.
#[derive(Debug, PartialEq, Eq)]
pub struct QueueClosed;

struct Shared {
    buf: Mutex<VecDeque<OhlcRecord>>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
    depth: Arc<AtomicUsize>,
    dropped: AtomicU64,
    tx_closed: AtomicBool,
    rx_closed: AtomicBool,
}

/// Producer half. Owned by the adapter task.
pub struct QueueSender {
    shared: Arc<Shared>,
}

/// Consumer half. Owned by the writer task.
pub struct QueueReceiver {
    shared: Arc<Shared>,
}

/// Creates a bounded queue with the given capacity and overflow policy.
#[must_use]
pub fn bounded(capacity: usize, policy: OverflowPolicy) -> (QueueSender, QueueReceiver) {
    let shared = Arc::new(Shared {
        buf: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
        capacity: capacity.max(1),
        policy,
        not_empty: Notify::new(),
        not_full: Notify::new(),
        depth: Arc::new(AtomicUsize::new(0)),
        dropped: AtomicU64::new(0),
        tx_closed: AtomicBool::new(false),
        rx_closed: AtomicBool::new(false),
    });

    (
        QueueSender {
            shared: shared.clone(),
        },
        QueueReceiver { shared },
    )
}

impl QueueSender {
    /// Enqueues a record, applying the overflow policy when full.
    ///
    /// Under [`OverflowPolicy::Block`] this suspends until the consumer
    /// makes room. Under [`OverflowPolicy::DropOldest`] it never suspends.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the receiver is gone; the caller should
    /// treat this as shutdown.
    pub async fn push(&mut self, record: OhlcRecord) -> Result<(), QueueClosed> {
        let shared = &*self.shared;

        loop {
            if shared.rx_closed.load(Ordering::Acquire) {
                return Err(QueueClosed);
            }

            // Create the wakeup future before checking capacity so a
            // notification between unlock and await is not lost.
            let notified = shared.not_full.notified();
            {
                let mut buf = shared.buf.lock().expect("queue mutex poisoned");

                if buf.len() < shared.capacity {
                    buf.push_back(record);
                    shared.depth.store(buf.len(), Ordering::Release);
                    drop(buf);
                    shared.not_empty.notify_one();
                    return Ok(());
                }

                if shared.policy == OverflowPolicy::DropOldest {
                    buf.pop_front();
                    buf.push_back(record);
                    shared.depth.store(buf.len(), Ordering::Release);
                    drop(buf);
                    let dropped = shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    warn!(
                        dropped_total = dropped,
                        capacity = shared.capacity,
                        "queue full, shed oldest record"
                    );
                    shared.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Shared gauge of the current queue depth, read by the health tracker.
    #[must_use]
    pub fn depth_gauge(&self) -> Arc<AtomicUsize> {
        self.shared.depth.clone()
    }

    /// Total records shed under [`OverflowPolicy::DropOldest`].
    #[must_use]
    pub fn dropped_total(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for QueueSender {
    fn drop(&mut self) {
        self.shared.tx_closed.store(true, Ordering::Release);
        self.shared.not_empty.notify_one();
    }
}

impl QueueReceiver {
    /// Dequeues the next record in arrival order.
    ///
    /// Returns `None` once the sender is dropped and the buffer is fully
    /// drained, so shutdown never discards buffered records.
    pub async fn recv(&mut self) -> Option<OhlcRecord> {
        let shared = &*self.shared;

        loop {
            let notified = shared.not_empty.notified();
            {
                let mut buf = shared.buf.lock().expect("queue mutex poisoned");
                if let Some(record) = buf.pop_front() {
                    shared.depth.store(buf.len(), Ordering::Release);
                    drop(buf);
                    shared.not_full.notify_one();
                    return Some(record);
                }
            }

            if shared.tx_closed.load(Ordering::Acquire) {
                return None;
            }

            notified.await;
        }
    }
}

impl Drop for QueueReceiver {
    fn drop(&mut self) {
        self.shared.rx_closed.store(true, Ordering::Release);
        self.shared.not_full.notify_one();
    }
}
