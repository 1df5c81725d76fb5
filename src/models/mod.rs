//! Shared models for Kraken WebSocket V2 messages.
//!
//! Contains channel definitions, subscription request/response types,
//! and common protocol messages (ping/pong, heartbeat, status).

pub mod candle;

use serde::{Deserialize, Serialize};

/// Kraken WebSocket V2 channels used by the pipeline.
pub enum Channel {
    /// OHLC candlestick data (wire name: `"ohlc"`).
    Candles,
    Status,
    Heartbeat,
}

impl Channel {
    /// Returns the wire-format channel name expected by the Kraken API.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Candles => "ohlc",
            Channel::Status => "status",
            Channel::Heartbeat => "heartbeat",
        }
    }
}

/// A `subscribe` request for the `ohlc` channel.
///
/// `snapshot: true` asks the server to replay recent candles on
/// subscription, which is also what arrives after every reconnect.
#[derive(Serialize)]
pub struct OhlcSubscribeRequest {
    pub method: String,
    pub params: OhlcParams,
    pub req_id: u64,
}

impl OhlcSubscribeRequest {
    #[must_use]
    pub fn new(symbols: &[String], interval: u32, snapshot: bool, req_id: u64) -> Self {
        Self {
            method: "subscribe".to_string(),
            params: OhlcParams {
                channel: Channel::Candles.as_str().to_string(),
                symbol: symbols.to_vec(),
                interval,
                snapshot: Some(snapshot),
            },
            req_id,
        }
    }
}

/// An `unsubscribe` request for the `ohlc` channel.
#[derive(Serialize)]
pub struct OhlcUnsubscribeRequest {
    pub method: String,
    pub params: OhlcParams,
    pub req_id: u64,
}

impl OhlcUnsubscribeRequest {
    #[must_use]
    pub fn new(symbols: &[String], interval: u32, req_id: u64) -> Self {
        Self {
            method: "unsubscribe".to_string(),
            params: OhlcParams {
                channel: Channel::Candles.as_str().to_string(),
                symbol: symbols.to_vec(),
                interval,
                snapshot: None,
            },
            req_id,
        }
    }
}

/// Channel, symbol and interval parameters for `ohlc` requests.
#[derive(Serialize)]
pub struct OhlcParams {
    pub channel: String,
    pub symbol: Vec<String>,
    pub interval: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<bool>,
}

/// Server acknowledgment of a subscribe/unsubscribe request.
#[derive(Debug, Deserialize)]
pub struct SubscribeAckResponse {
    pub method: String,
    pub success: bool,
    pub result: Option<OhlcAckResult>,
    pub error: Option<String>,
    pub req_id: Option<u64>,
}

/// Echo of the accepted subscription parameters.
#[derive(Debug, Deserialize)]
pub struct OhlcAckResult {
    pub channel: String,
    pub symbol: Option<String>,
    pub interval: Option<u32>,
    pub snapshot: Option<bool>,
}

/// A `ping` request used to test connection liveness.
#[derive(Serialize)]
pub struct PingRequest {
    pub method: String,
}

impl PingRequest {
    #[must_use]
    pub fn new() -> Self {
        Self {
            method: "ping".to_string(),
        }
    }
}

impl Default for PingRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Server response to a [`PingRequest`].
#[derive(Deserialize)]
pub struct PongResponse {
    pub method: String,
    pub time_in: String,
    pub time_out: String,
}

/// Periodic heartbeat message indicating the connection is alive.
#[derive(Deserialize)]
pub struct HeartbeatResponse {
    pub channel: String,
}

/// System status update broadcast on the `status` channel.
#[derive(Deserialize)]
pub struct StatusUpdateResponse {
    pub channel: String,
    #[serde(rename = "type")]
    pub tpe: String,
    pub data: Vec<StatusData>,
}

/// Detailed system status information.
#[derive(Deserialize)]
pub struct StatusData {
    pub api_version: String,
    pub connection_id: u64,
    pub system: String,
    pub version: String,
}
