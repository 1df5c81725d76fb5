//! WebSocket connection lifecycle management.
//!
//! [`ConnectionManager`] handles connecting, reading messages, automatic
//! reconnection with exponential backoff, staleness detection, and
//! re-subscription to every configured series after each reconnect.
//! Inbound candles are normalized, deduplicated, and fed into the
//! backpressure queue; everything downstream is the writer task's problem.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tungstenite::Message as WsMessage;

use super::{WsReader, WsWriter, connect, ping, subscribe_ohlc, unsubscribe_ohlc};
use crate::config::KrakenConfig;
use crate::dedup::RecentKeyFilter;
use crate::health::{HealthEvent, HealthTracker};
use crate::models::candle::CandleUpdateResponse;
use crate::models::{Channel, StatusUpdateResponse, SubscribeAckResponse};
use crate::ohlc::OhlcRecord;
use crate::queue::{QueueClosed, QueueSender};

/// Exchange identifier stamped on every normalized record.
const SOURCE: &str = "kraken";

/// Initial backoff duration between reconnection attempts.
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Maximum backoff duration between reconnection attempts.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Why the reader loop exited.
enum DisconnectReason {
    /// The connection was lost or errored.
    ConnectionError,
    /// No message arrived within the staleness timeout.
    Stale,
    /// Shutdown was requested, or the writer task is gone.
    Shutdown,
}

/// Manages the WebSocket connection lifecycle including reconnection with
/// exponential backoff and mandatory resubscription after each reconnect.
pub struct ConnectionManager {
    config: KrakenConfig,
    tx: QueueSender,
    dedup: RecentKeyFilter,
    health: Arc<HealthTracker>,
    shutdown: watch::Receiver<bool>,
    req_id: u64,
}

impl ConnectionManager {
    /// Creates a new connection manager feeding the given queue.
    #[must_use]
    pub fn new(
        config: KrakenConfig,
        tx: QueueSender,
        dedup: RecentKeyFilter,
        health: Arc<HealthTracker>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            tx,
            dedup,
            health,
            shutdown,
            req_id: 0,
        }
    }

    /// Runs the connection manager loop until shutdown.
    ///
    /// Connects to the WebSocket, subscribes the configured series, reads
    /// messages, and automatically reconnects with exponential backoff on
    /// disconnection or staleness. On shutdown the subscription is closed
    /// cleanly before returning; dropping `self` then closes the queue so
    /// the writer can drain.
    pub async fn run(mut self) {
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if *self.shutdown.borrow() {
                info!("Connection manager shutting down before connect");
                return;
            }

            info!(url = %self.config.websocket_url, "Connecting to WebSocket");
            let (mut write, read) = match connect(&self.config.websocket_url).await {
                Ok(pair) => pair,
                Err(e) => {
                    error!("Connection failed: {e}");
                    self.health.record(HealthEvent::Disconnected);
                    info!(backoff_secs = backoff.as_secs(), "Backing off before retry");
                    if self.backoff_or_shutdown(backoff).await {
                        return;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                    continue;
                }
            };

            // Connected — ping and subscribe
            if let Err(e) = ping(&mut write).await {
                warn!("Ping failed: {e}");
                self.health.record(HealthEvent::Disconnected);
                if self.backoff_or_shutdown(backoff).await {
                    return;
                }
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }

            // Resubscription is mandatory on every connect: a reconnect
            // without it is a silent data-loss bug.
            self.resubscribe_all(&mut write).await;
            self.health.record(HealthEvent::Connected);
            info!("WebSocket connected and subscribed");

            // Reset backoff on successful connection
            backoff = INITIAL_BACKOFF;

            let reason = self.read_loop(read).await;

            match reason {
                DisconnectReason::Stale => {
                    warn!(
                        timeout_secs = self.config.staleness_timeout.as_secs(),
                        "No message within staleness timeout, forcing reconnect"
                    );
                    self.health.record(HealthEvent::Disconnected);
                    // Planned reconnect, no backoff
                }
                DisconnectReason::ConnectionError => {
                    self.health.record(HealthEvent::Disconnected);
                    info!(
                        backoff_secs = backoff.as_secs(),
                        "Connection lost, backing off"
                    );
                    if self.backoff_or_shutdown(backoff).await {
                        return;
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
                DisconnectReason::Shutdown => {
                    self.close_cleanly(&mut write).await;
                    info!("Connection manager shutting down");
                    return;
                }
            }
        }
    }

    /// Sleeps for `delay`, returning `true` early if shutdown is requested.
    async fn backoff_or_shutdown(&mut self, delay: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(delay) => false,
            _ = self.shutdown.wait_for(|stop| *stop) => true,
        }
    }

    /// Subscribes every configured timeframe on the given writer.
    async fn resubscribe_all(&mut self, write: &mut WsWriter) {
        for timeframe in self.config.timeframes.clone() {
            self.req_id += 1;
            if let Err(e) =
                subscribe_ohlc(write, &self.config.symbols, timeframe, true, self.req_id).await
            {
                warn!(
                    timeframe = timeframe.as_str(),
                    "Failed to subscribe: {e}"
                );
                self.health.record(HealthEvent::SubscribeFailed);
            }
        }
    }

    /// Unsubscribes everything and closes the socket.
    async fn close_cleanly(&mut self, write: &mut WsWriter) {
        for timeframe in self.config.timeframes.clone() {
            self.req_id += 1;
            if let Err(e) =
                unsubscribe_ohlc(write, &self.config.symbols, timeframe, self.req_id).await
            {
                debug!(
                    timeframe = timeframe.as_str(),
                    "Unsubscribe during shutdown failed: {e}"
                );
            }
        }
        let _ = write.close().await;
        info!("Closed exchange subscription");
    }

    /// Reads messages from the WebSocket until disconnection, staleness,
    /// or shutdown.
    async fn read_loop(&mut self, mut read: WsReader) -> DisconnectReason {
        let mut shutdown = self.shutdown.clone();

        loop {
            // Re-armed every iteration: an inactivity deadline, not a
            // connection lifetime limit.
            let stale = tokio::time::sleep(self.config.staleness_timeout);

            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            self.health.record(HealthEvent::MessageReceived);
                            if self.handle_text(&text).await.is_err() {
                                // Writer side is gone; nothing left to feed.
                                return DisconnectReason::Shutdown;
                            }
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong/Close frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionError;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionError;
                        }
                    }
                }

                () = stale => {
                    return DisconnectReason::Stale;
                }

                _ = async {
                    while !*shutdown.borrow() {
                        if shutdown.changed().await.is_err() {
                            break;
                        }
                    }
                } => {
                    return DisconnectReason::Shutdown;
                }
            }
        }
    }

    /// Routes one text frame; normalized candles go into the queue.
    ///
    /// Malformed payloads drop the single offending message and keep the
    /// stream alive. The only error surfaced is a closed queue.
    async fn handle_text(&mut self, text: &str) -> Result<(), QueueClosed> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                warn!("Dropping unparseable message: {e}");
                self.health.record(HealthEvent::MalformedMessage);
                return Ok(());
            }
        };

        // Extract routing fields as owned strings to avoid borrow conflicts
        let method = value
            .get("method")
            .and_then(|m| m.as_str())
            .map(String::from);
        let channel = value
            .get("channel")
            .and_then(|c| c.as_str())
            .map(String::from);

        if let Some(method) = method.as_deref() {
            match method {
                "pong" => debug!("Received pong"),
                "subscribe" | "unsubscribe" => self.handle_ack(value),
                other => debug!(method = other, "Ignoring RPC response"),
            }
            return Ok(());
        }

        match channel.as_deref() {
            Some(ch) if ch == Channel::Heartbeat.as_str() => {
                debug!("Received heartbeat");
            }
            Some(ch) if ch == Channel::Status.as_str() => {
                if let Ok(response) = serde_json::from_value::<StatusUpdateResponse>(value) {
                    for status in &response.data {
                        info!(
                            system = status.system,
                            api_version = status.api_version,
                            version = status.version,
                            connection_id = status.connection_id,
                            "Status update"
                        );
                    }
                }
            }
            Some(ch) if ch == Channel::Candles.as_str() => {
                return self.handle_candles(value).await;
            }
            Some(other) => debug!(channel = other, "Ignoring unknown channel"),
            None => debug!("Ignoring message with no method or channel"),
        }

        Ok(())
    }

    /// Logs a subscribe/unsubscribe acknowledgment, recording failures.
    fn handle_ack(&mut self, value: serde_json::Value) {
        match serde_json::from_value::<SubscribeAckResponse>(value) {
            Ok(ack) if ack.success => {
                debug!(method = ack.method, req_id = ?ack.req_id, "Request acknowledged");
            }
            Ok(ack) => {
                warn!(
                    method = ack.method,
                    error = ?ack.error,
                    req_id = ?ack.req_id,
                    "Subscription request rejected"
                );
                self.health.record(HealthEvent::SubscribeFailed);
            }
            Err(e) => {
                warn!("Dropping malformed acknowledgment: {e}");
                self.health.record(HealthEvent::MalformedMessage);
            }
        }
    }

    /// Normalizes an `ohlc` snapshot or update payload into the queue.
    ///
    /// Snapshots are the reconnect replay path and flow through the same
    /// dedup filter as live updates.
    async fn handle_candles(&mut self, value: serde_json::Value) -> Result<(), QueueClosed> {
        let response: CandleUpdateResponse = match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                warn!("Dropping malformed candle message: {e}");
                self.health.record(HealthEvent::MalformedMessage);
                return Ok(());
            }
        };

        for candle in &response.data {
            let record = match OhlcRecord::from_kraken(candle, SOURCE) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Dropping candle: {e}");
                    self.health.record(HealthEvent::MalformedMessage);
                    continue;
                }
            };

            if !self.dedup.admit(&record) {
                debug!(
                    symbol = record.symbol,
                    timeframe = record.timeframe.as_str(),
                    open_time = %record.open_time,
                    "Dropping duplicate candle"
                );
                continue;
            }

            self.tx.push(record).await?;
        }

        Ok(())
    }
}
