//! Shared test utilities: an in-memory store and a scriptable mock
//! exchange server speaking just enough of the Kraken V2 protocol.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tungstenite::Message;

use krill::ohlc::{OhlcRecord, Timeframe, missing_buckets};
use krill::store::OhlcStore;

/// In-memory [`OhlcStore`] with upsert-by-identity-key semantics.
///
/// Rows keep arrival order; an upsert of an existing identity key replaces
/// the row in place, mirroring `ON CONFLICT ... DO UPDATE`.
#[derive(Clone, Default)]
pub struct MemoryStore {
    rows: Arc<Mutex<Vec<OhlcRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<OhlcRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl OhlcStore for MemoryStore {
    async fn upsert_batch(&self, records: &[OhlcRecord]) -> krill::Result<u64> {
        let mut rows = self.rows.lock().unwrap();
        for record in records {
            match rows.iter_mut().find(|r| r.identity() == record.identity()) {
                Some(existing) => *existing = record.clone(),
                None => rows.push(record.clone()),
            }
        }
        Ok(records.len() as u64)
    }

    async fn last_seen(
        &self,
        symbol: &str,
        timeframe: Timeframe,
    ) -> krill::Result<Option<DateTime<Utc>>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.symbol == symbol && r.timeframe == timeframe)
            .map(|r| r.open_time)
            .max())
    }

    async fn list_gaps(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since: DateTime<Utc>,
    ) -> krill::Result<Vec<DateTime<Utc>>> {
        let mut observed: Vec<DateTime<Utc>> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.symbol == symbol && r.timeframe == timeframe && r.open_time >= since)
            .map(|r| r.open_time)
            .collect();
        observed.sort();
        Ok(missing_buckets(&observed, timeframe.bucket(), since))
    }
}

/// What the mock exchange does with one accepted connection.
pub struct ConnPlan {
    /// Frames sent after the first subscribe request arrives.
    pub frames: Vec<String>,
    /// Close the connection after sending the frames, simulating a
    /// server-side disconnect.
    pub close_after: bool,
}

/// A local WebSocket server that acks subscriptions, records every
/// subscribe frame it sees, and plays one [`ConnPlan`] per connection.
pub struct MockExchange {
    pub addr: SocketAddr,
    subscribes: Arc<Mutex<Vec<serde_json::Value>>>,
    _handle: JoinHandle<()>,
}

impl MockExchange {
    pub async fn start(plans: Vec<ConnPlan>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let subscribes: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();

        let seen = subscribes.clone();
        let handle = tokio::spawn(async move {
            for plan in plans {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                let Ok(mut ws) = accept_async(stream).await else {
                    return;
                };

                let mut sent_frames = false;
                while let Some(Ok(msg)) = ws.next().await {
                    let Message::Text(text) = msg else {
                        continue;
                    };
                    let Ok(value) = serde_json::from_str::<serde_json::Value>(&text) else {
                        continue;
                    };

                    match value.get("method").and_then(|m| m.as_str()) {
                        Some("ping") => {
                            let pong = serde_json::json!({
                                "method": "pong",
                                "time_in": "2024-01-15T10:00:00.000000Z",
                                "time_out": "2024-01-15T10:00:00.000100Z",
                            });
                            let _ = ws.send(Message::Text(pong.to_string().into())).await;
                        }
                        Some("subscribe") => {
                            let ack = serde_json::json!({
                                "method": "subscribe",
                                "success": true,
                                "result": value.get("params"),
                                "req_id": value.get("req_id"),
                            });
                            seen.lock().unwrap().push(value);
                            let _ = ws.send(Message::Text(ack.to_string().into())).await;

                            if !sent_frames {
                                sent_frames = true;
                                for frame in &plan.frames {
                                    let _ =
                                        ws.send(Message::Text(frame.clone().into())).await;
                                }
                                if plan.close_after {
                                    let _ = ws.close(None).await;
                                    break;
                                }
                            }
                        }
                        _ => {} // unsubscribe and anything else: ignore
                    }
                }
            }
        });

        Self {
            addr,
            subscribes,
            _handle: handle,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Subscribe frames received so far, across all connections.
    pub fn subscribes(&self) -> Vec<serde_json::Value> {
        self.subscribes.lock().unwrap().clone()
    }
}

/// Builds an `ohlc` channel frame with the given candles.
///
/// Each candle is `(symbol, "HH:MM" bucket start, close price)`; the rest
/// of the fields are internally consistent filler.
pub fn ohlc_frame(msg_type: &str, candles: &[(&str, &str, f64)]) -> String {
    let data: Vec<serde_json::Value> = candles
        .iter()
        .map(|(symbol, begin, close)| {
            serde_json::json!({
                "symbol": symbol,
                "open": close - 10.0,
                "high": close + 20.0,
                "low": close - 30.0,
                "close": close,
                "vwap": close - 5.0,
                "trades": 42,
                "volume": 1.5,
                "interval_begin": format!("2024-01-15T{begin}:00.000000000Z"),
                "interval": 15,
                "timestamp": format!("2024-01-15T{begin}:01.000000Z"),
            })
        })
        .collect();

    serde_json::json!({
        "channel": "ohlc",
        "type": msg_type,
        "timestamp": "2024-01-15T10:30:00.000000Z",
        "data": data,
    })
    .to_string()
}
