//! Wire-format tests for Kraken WebSocket V2 model types.

use rust_decimal_macros::dec;

use krill::models::candle::{CandleData, CandleUpdateResponse};
use krill::models::{
    Channel, HeartbeatResponse, OhlcSubscribeRequest, OhlcUnsubscribeRequest, PingRequest,
    PongResponse, StatusData, StatusUpdateResponse, SubscribeAckResponse,
};

const CANDLE_UPDATE_JSON: &str = include_str!("fixtures/candle_update.json");
const CANDLE_SNAPSHOT_JSON: &str = include_str!("fixtures/candle_snapshot.json");
const HEARTBEAT_JSON: &str = include_str!("fixtures/heartbeat.json");
const STATUS_JSON: &str = include_str!("fixtures/status.json");
const PONG_JSON: &str = include_str!("fixtures/pong.json");
const SUBSCRIBE_ACK_JSON: &str = include_str!("fixtures/subscribe_ack.json");
const SUBSCRIBE_ERROR_JSON: &str = include_str!("fixtures/subscribe_error.json");

#[test]
fn test_channel_as_str_returns_correct_wire_names() {
    assert_eq!(Channel::Candles.as_str(), "ohlc");
    assert_eq!(Channel::Status.as_str(), "status");
    assert_eq!(Channel::Heartbeat.as_str(), "heartbeat");
}

#[test]
fn test_candle_update_response_deserializes() {
    let response: CandleUpdateResponse =
        serde_json::from_str(CANDLE_UPDATE_JSON).expect("Failed to deserialize candle response");

    assert_eq!(response.channel, "ohlc");
    assert_eq!(response.tpe, "update");
    assert_eq!(response.data.len(), 1);

    let candle: &CandleData = &response.data[0];
    assert_eq!(candle.symbol, "BTC/USD");
    assert_eq!(candle.open, dec!(42100.0));
    assert_eq!(candle.high, dec!(42200.0));
    assert_eq!(candle.low, dec!(42050.0));
    assert_eq!(candle.close, dec!(42152.0));
    assert_eq!(candle.vwap, dec!(42125.5));
    assert_eq!(candle.trades, 150);
    assert_eq!(candle.volume, dec!(25.5));
    assert_eq!(candle.interval_begin, "2024-01-15T10:15:00.000000000Z");
    assert_eq!(candle.interval, 15);
}

#[test]
fn test_candle_snapshot_response_deserializes() {
    let response: CandleUpdateResponse =
        serde_json::from_str(CANDLE_SNAPSHOT_JSON).expect("Failed to deserialize snapshot");

    assert_eq!(response.channel, "ohlc");
    assert_eq!(response.tpe, "snapshot");
    assert_eq!(response.data.len(), 2);
    assert_eq!(response.data[0].interval_begin, "2024-01-15T10:00:00.000000000Z");
    assert_eq!(response.data[1].interval_begin, "2024-01-15T10:15:00.000000000Z");
}

#[test]
fn test_heartbeat_response_deserializes() {
    let response: HeartbeatResponse =
        serde_json::from_str(HEARTBEAT_JSON).expect("Failed to deserialize heartbeat");

    assert_eq!(response.channel, "heartbeat");
}

#[test]
fn test_status_update_response_deserializes() {
    let response: StatusUpdateResponse =
        serde_json::from_str(STATUS_JSON).expect("Failed to deserialize status response");

    assert_eq!(response.channel, "status");
    assert_eq!(response.tpe, "update");
    assert_eq!(response.data.len(), 1);

    let status: &StatusData = &response.data[0];
    assert_eq!(status.api_version, "v2");
    assert_eq!(status.system, "online");
    assert_eq!(status.version, "2.0.9");
    assert_eq!(status.connection_id, 12895347783148369);
}

#[test]
fn test_pong_response_deserializes() {
    let response: PongResponse =
        serde_json::from_str(PONG_JSON).expect("Failed to deserialize pong");

    assert_eq!(response.method, "pong");
    assert_eq!(response.time_in, "2024-01-15T10:00:00.123456Z");
    assert_eq!(response.time_out, "2024-01-15T10:00:00.123789Z");
}

#[test]
fn test_subscribe_ack_deserializes() {
    let response: SubscribeAckResponse =
        serde_json::from_str(SUBSCRIBE_ACK_JSON).expect("Failed to deserialize ack");

    assert_eq!(response.method, "subscribe");
    assert!(response.success);
    assert_eq!(response.req_id, Some(1));

    let result = response.result.expect("ack should echo params");
    assert_eq!(result.channel, "ohlc");
    assert_eq!(result.symbol.as_deref(), Some("BTC/USD"));
    assert_eq!(result.interval, Some(15));
    assert_eq!(result.snapshot, Some(true));
}

#[test]
fn test_subscribe_error_deserializes() {
    let response: SubscribeAckResponse =
        serde_json::from_str(SUBSCRIBE_ERROR_JSON).expect("Failed to deserialize error ack");

    assert!(!response.success);
    assert_eq!(
        response.error.as_deref(),
        Some("Currency pair not supported BAD/USD")
    );
    assert_eq!(response.req_id, Some(2));
}

#[test]
fn test_ping_request_serializes() {
    let request = PingRequest::new();

    let json = serde_json::to_string(&request).expect("Failed to serialize ping request");
    let value: serde_json::Value =
        serde_json::from_str(&json).expect("Failed to parse serialized JSON");

    assert_eq!(value["method"], "ping");
}

#[test]
fn test_ohlc_subscribe_request_serializes() {
    let symbols = vec!["BTC/USD".to_string(), "ETH/USD".to_string()];
    let request = OhlcSubscribeRequest::new(&symbols, 15, true, 7);

    let json = serde_json::to_string(&request).expect("Failed to serialize subscribe request");
    let value: serde_json::Value =
        serde_json::from_str(&json).expect("Failed to parse serialized JSON");

    assert_eq!(value["method"], "subscribe");
    assert_eq!(value["params"]["channel"], "ohlc");
    assert_eq!(value["params"]["symbol"][0], "BTC/USD");
    assert_eq!(value["params"]["symbol"][1], "ETH/USD");
    assert_eq!(value["params"]["interval"], 15);
    assert_eq!(value["params"]["snapshot"], true);
    assert_eq!(value["req_id"], 7);
}

#[test]
fn test_ohlc_unsubscribe_request_serializes() {
    let symbols = vec!["BTC/USD".to_string()];
    let request = OhlcUnsubscribeRequest::new(&symbols, 60, 8);

    let json = serde_json::to_string(&request).expect("Failed to serialize unsubscribe request");
    let value: serde_json::Value =
        serde_json::from_str(&json).expect("Failed to parse serialized JSON");

    assert_eq!(value["method"], "unsubscribe");
    assert_eq!(value["params"]["channel"], "ohlc");
    assert_eq!(value["params"]["symbol"][0], "BTC/USD");
    assert_eq!(value["params"]["interval"], 60);
    assert!(value["params"].get("snapshot").is_none());
    assert_eq!(value["req_id"], 8);
}
