//! Normalized OHLC domain types.
//!
//! Everything downstream of the WebSocket layer works with [`OhlcRecord`],
//! the exchange-agnostic candle shape keyed by
//! `(symbol, timeframe, open_time, source)`.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::models::candle::CandleData;

/// Fixed candle bucket sizes accepted by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Timeframe {
    M15,
    H1,
    H4,
    H6,
}

impl Timeframe {
    /// Returns the storage label for this timeframe.
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::H6 => "6h",
        }
    }

    /// Returns the wire-format interval in minutes expected by the Kraken API.
    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::H6 => 360,
        }
    }

    /// Bucket width as a duration.
    pub fn bucket(&self) -> Duration {
        Duration::minutes(i64::from(self.minutes()))
    }

    /// Parses a storage label (`"15m"`, `"1h"`, ...).
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "15m" => Some(Timeframe::M15),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "6h" => Some(Timeframe::H6),
            _ => None,
        }
    }

    /// Parses a wire-format interval in minutes.
    pub fn from_minutes(minutes: u64) -> Option<Self> {
        match minutes {
            15 => Some(Timeframe::M15),
            60 => Some(Timeframe::H1),
            240 => Some(Timeframe::H4),
            360 => Some(Timeframe::H6),
            _ => None,
        }
    }
}

/// Identity key of a stored candle. No two rows may share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    pub symbol: String,
    pub timeframe: &'static str,
    pub open_time: DateTime<Utc>,
    pub source: String,
}

/// One normalized candle for one symbol/timeframe/time bucket.
///
/// Immutable after creation; a later correction for the same identity key
/// is a new record that replaces the stored row (last-write-wins by
/// arrival order).
#[derive(Debug, Clone, PartialEq)]
pub struct OhlcRecord {
    pub symbol: String,
    pub timeframe: Timeframe,
    /// Bucket start, UTC.
    pub open_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    pub trades: i64,
    /// Exchange identifier, e.g. `"kraken"`.
    pub source: String,
}

impl OhlcRecord {
    /// Normalizes a Kraken wire candle into an [`OhlcRecord`].
    ///
    /// # Errors
    ///
    /// Returns [`KrillError::MalformedMessage`](crate::KrillError::MalformedMessage)
    /// for an unknown interval, an unparseable timestamp, or a candle that
    /// violates `high >= max(open, close)`, `low <= min(open, close)`, or
    /// `volume >= 0`. The caller drops the single candle and continues.
    pub fn from_kraken(candle: &CandleData, source: &str) -> crate::Result<Self> {
        let timeframe = Timeframe::from_minutes(candle.interval).ok_or_else(|| {
            crate::KrillError::MalformedMessage(format!(
                "unknown candle interval {} for {}",
                candle.interval, candle.symbol
            ))
        })?;

        let open_time = DateTime::parse_from_rfc3339(&candle.interval_begin)
            .map_err(|e| {
                crate::KrillError::MalformedMessage(format!(
                    "bad interval_begin {:?}: {e}",
                    candle.interval_begin
                ))
            })?
            .with_timezone(&Utc);

        let record = Self {
            symbol: candle.symbol.clone(),
            timeframe,
            open_time,
            open: candle.open,
            high: candle.high,
            low: candle.low,
            close: candle.close,
            volume: candle.volume,
            trades: i64::try_from(candle.trades).unwrap_or(i64::MAX),
            source: source.to_string(),
        };
        record.validate()?;

        Ok(record)
    }

    /// Checks the candle price/volume invariants.
    fn validate(&self) -> crate::Result<()> {
        if self.high < self.open.max(self.close)
            || self.low > self.open.min(self.close)
            || self.volume < Decimal::ZERO
        {
            return Err(crate::KrillError::MalformedMessage(format!(
                "inconsistent candle for {} @ {}: o={} h={} l={} c={} v={}",
                self.symbol, self.open_time, self.open, self.high, self.low, self.close,
                self.volume
            )));
        }
        Ok(())
    }

    /// Returns the identity key used for deduplication and storage upserts.
    pub fn identity(&self) -> DedupKey {
        DedupKey {
            symbol: self.symbol.clone(),
            timeframe: self.timeframe.as_str(),
            open_time: self.open_time,
            source: self.source.clone(),
        }
    }
}

/// Returns the bucket timestamps missing from `observed` between `since`
/// and the newest observed bucket, stepping by `step`.
///
/// `observed` must be sorted ascending (storage queries return it that
/// way). An empty slice yields no gaps: with nothing stored yet there is
/// nothing to be behind on.
pub fn missing_buckets(
    observed: &[DateTime<Utc>],
    step: Duration,
    since: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    let Some(&newest) = observed.last() else {
        return Vec::new();
    };

    let present: HashSet<DateTime<Utc>> = observed.iter().copied().collect();
    let mut gaps = Vec::new();
    let mut t = since;
    while t <= newest {
        if !present.contains(&t) {
            gaps.push(t);
        }
        t += step;
    }

    gaps
}
