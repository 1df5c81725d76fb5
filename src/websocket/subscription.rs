//! OHLC channel subscription and unsubscription operations.

use futures_util::SinkExt;
use tracing::{debug, info};
use tungstenite::Message;

use super::WsWriter;
use crate::Result;
use crate::models::{OhlcSubscribeRequest, OhlcUnsubscribeRequest};
use crate::ohlc::Timeframe;

/// Subscribes to OHLC candles for the given symbols and timeframe.
///
/// With `snapshot` set, the server replays recent candles immediately —
/// after a reconnect this replay is how missed buckets are recovered, and
/// also why the pipeline deduplicates.
///
/// # Errors
///
/// Returns a [`KrillError`](crate::KrillError) if sending the subscription
/// message fails.
pub async fn subscribe_ohlc(
    write: &mut WsWriter,
    symbols: &[String],
    timeframe: Timeframe,
    snapshot: bool,
    req_id: u64,
) -> Result<()> {
    let request = OhlcSubscribeRequest::new(symbols, timeframe.minutes(), snapshot, req_id);
    let json = serde_json::to_string(&request)?;
    debug!("Sending subscribe request: {}", json);
    write.send(Message::Text(json.into())).await?;
    info!(
        timeframe = timeframe.as_str(),
        ?symbols,
        req_id,
        "Subscribed to ohlc channel"
    );

    Ok(())
}

/// Unsubscribes from OHLC candles for the given symbols and timeframe.
///
/// # Errors
///
/// Returns a [`KrillError`](crate::KrillError) if sending the unsubscribe
/// message fails.
pub async fn unsubscribe_ohlc(
    write: &mut WsWriter,
    symbols: &[String],
    timeframe: Timeframe,
    req_id: u64,
) -> Result<()> {
    let request = OhlcUnsubscribeRequest::new(symbols, timeframe.minutes(), req_id);
    let json = serde_json::to_string(&request)?;
    debug!("Sending unsubscribe request: {}", json);
    write.send(Message::Text(json.into())).await?;
    info!(
        timeframe = timeframe.as_str(),
        ?symbols,
        req_id,
        "Unsubscribed from ohlc channel"
    );

    Ok(())
}
