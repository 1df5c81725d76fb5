//! Application configuration loaded from environment variables.
//!
//! The database connection string **must** be provided:
//! - `DATABASE_URL` — Postgres/TimescaleDB connection string
//!
//! Everything else has a default:
//! - `KRAKEN_WEBSOCKET_URL` — exchange endpoint (default `wss://ws.kraken.com/v2`)
//! - `KRILL_SYMBOLS` — comma-separated pairs (default `BTC/USD,ETH/USD`)
//! - `KRILL_TIMEFRAMES` — comma-separated of `15m,1h,4h,6h` (default `15m`)
//! - `KRILL_QUEUE_CAPACITY` — backpressure queue bound (default 4096)
//! - `KRILL_OVERFLOW_POLICY` — `block` or `drop-oldest` (default `block`)
//! - `KRILL_BATCH_SIZE` — flush-on-size threshold (default 1000)
//! - `KRILL_FLUSH_INTERVAL_SECS` — flush-on-timer period (default 5)
//! - `KRILL_DEDUP_CAPACITY` — per-series recency cache size (default 512)
//! - `KRILL_STALENESS_TIMEOUT_SECS` — no-message reconnect threshold (default 90)

use std::time::Duration;

use crate::ohlc::Timeframe;
use crate::queue::OverflowPolicy;

/// Default public WebSocket endpoint.
const DEFAULT_WEBSOCKET_URL: &str = "wss://ws.kraken.com/v2";

/// Top-level application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub kraken: KrakenConfig,
    pub queue_capacity: usize,
    pub overflow_policy: OverflowPolicy,
    pub max_batch_size: usize,
    pub flush_interval: Duration,
    pub dedup_capacity: usize,
}

/// Kraken-specific configuration values.
#[derive(Debug, Clone)]
pub struct KrakenConfig {
    pub websocket_url: String,
    pub symbols: Vec<String>,
    pub timeframes: Vec<Timeframe>,
    pub staleness_timeout: Duration,
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`KrillError::Config`](crate::KrillError::Config) if
/// `DATABASE_URL` is missing, or if any override fails to parse. The
/// process does not start in a partially configured state.
pub fn fetch_config() -> crate::Result<AppConfig> {
    let database_url = non_empty_var("DATABASE_URL")
        .ok_or_else(|| crate::KrillError::Config("DATABASE_URL is not set".to_string()))?;

    let websocket_url = non_empty_var("KRAKEN_WEBSOCKET_URL")
        .unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());

    let symbols = non_empty_var("KRILL_SYMBOLS")
        .map(|s| parse_list(&s))
        .unwrap_or_else(|| vec!["BTC/USD".to_string(), "ETH/USD".to_string()]);
    if symbols.is_empty() {
        return Err(crate::KrillError::Config(
            "KRILL_SYMBOLS must contain at least one pair".to_string(),
        ));
    }

    let timeframes = match non_empty_var("KRILL_TIMEFRAMES") {
        Some(s) => parse_list(&s)
            .iter()
            .map(|label| {
                Timeframe::from_label(label).ok_or_else(|| {
                    crate::KrillError::Config(format!(
                        "KRILL_TIMEFRAMES: unknown timeframe {label:?}"
                    ))
                })
            })
            .collect::<crate::Result<Vec<_>>>()?,
        None => vec![Timeframe::M15],
    };
    if timeframes.is_empty() {
        return Err(crate::KrillError::Config(
            "KRILL_TIMEFRAMES must contain at least one timeframe".to_string(),
        ));
    }

    let overflow_policy = match non_empty_var("KRILL_OVERFLOW_POLICY").as_deref() {
        None | Some("block") => OverflowPolicy::Block,
        Some("drop-oldest") => OverflowPolicy::DropOldest,
        Some(other) => {
            return Err(crate::KrillError::Config(format!(
                "KRILL_OVERFLOW_POLICY must be `block` or `drop-oldest`, got {other:?}"
            )));
        }
    };

    Ok(AppConfig {
        database_url,
        kraken: KrakenConfig {
            websocket_url,
            symbols,
            timeframes,
            staleness_timeout: Duration::from_secs(parse_var(
                "KRILL_STALENESS_TIMEOUT_SECS",
                90,
            )?),
        },
        queue_capacity: parse_var("KRILL_QUEUE_CAPACITY", 4096)?,
        overflow_policy,
        max_batch_size: parse_var("KRILL_BATCH_SIZE", 1000)?,
        flush_interval: Duration::from_secs(parse_var("KRILL_FLUSH_INTERVAL_SECS", 5)?),
        dedup_capacity: parse_var("KRILL_DEDUP_CAPACITY", 512)?,
    })
}

/// Returns the value of an environment variable if it exists and is non-empty.
fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Splits a comma-separated variable into trimmed, non-empty entries.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Parses a numeric environment variable, falling back to `default`.
fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> crate::Result<T> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| crate::KrillError::Config(format!("{name}: cannot parse {raw:?}"))),
        None => Ok(default),
    }
}
