//! Bounded recency filter for re-delivered candles.
//!
//! Kraken replays recent candles in the snapshot that follows every
//! (re)subscription. [`RecentKeyFilter`] suppresses records whose identity
//! key was already admitted within the recency window, so a reconnect storm
//! does not occupy queue capacity with rows storage already has. It is
//! best-effort and bounded: anything outside the window is caught by the
//! storage-side upsert instead.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::ohlc::{OhlcRecord, Timeframe};

/// Per-series cache of recently admitted bucket timestamps.
///
/// Owned by the adapter task; never shared, never locked.
pub struct RecentKeyFilter {
    capacity: usize,
    series: HashMap<(String, Timeframe), BTreeSet<DateTime<Utc>>>,
}

impl RecentKeyFilter {
    /// Creates a filter holding at most `capacity` timestamps per
    /// `(symbol, timeframe)` series.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: HashMap::new(),
        }
    }

    /// Returns `true` if this identity key has not been seen within the
    /// recency window, marking it seen. Returns `false` for a duplicate;
    /// the caller drops the record.
    ///
    /// Eviction is oldest-timestamp-first once a series reaches capacity,
    /// since re-delivery is overwhelmingly recent data.
    pub fn admit(&mut self, record: &OhlcRecord) -> bool {
        let seen = self
            .series
            .entry((record.symbol.clone(), record.timeframe))
            .or_default();

        if !seen.insert(record.open_time) {
            return false;
        }

        if seen.len() > self.capacity {
            seen.pop_first();
        }

        true
    }
}
