//! Realtime subscription to message inserts.
//!
//! Opens a WebSocket to `/realtime/messages` filtered to `INSERT` events on
//! `public.messages` and forwards each changed row, still untyped, over an
//! mpsc channel. Rows are validated by the consumer.

use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Path and filter of the messages insert feed.
const MESSAGES_FEED: &str = "/realtime/messages?event=INSERT&schema=public&table=messages";

/// Buffered rows before the reader task waits on the consumer.
const CHANNEL_CAPACITY: usize = 256;

/// Errors that can occur while opening a subscription.
#[derive(Error, Debug)]
pub enum RealtimeError {
    /// The server URL cannot be turned into a WebSocket URL.
    #[error("invalid server URL: {0}")]
    InvalidUrl(String),

    /// Access token contains characters not allowed in a header.
    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] InvalidHeaderValue),

    /// The WebSocket handshake failed (including a refused upgrade).
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

#[derive(Debug, Deserialize)]
struct ChangeFrame {
    event: String,
    table: String,
    #[serde(default)]
    new: Value,
}

/// A live subscription. Dropping it or calling [`Subscription::unsubscribe`]
/// closes the socket.
#[derive(Debug)]
pub struct Subscription {
    rows: mpsc::Receiver<Value>,
    reader: JoinHandle<()>,
}

impl Subscription {
    /// Waits for the next inserted row. Returns `None` once the server closes
    /// the feed.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rows.recv().await
    }

    /// Closes the subscription.
    pub fn unsubscribe(self) {
        self.reader.abort();
        info!("Unsubscribed from realtime feed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Subscribes to message inserts on the server at `base_url`.
///
/// # Errors
///
/// Returns an error if the URL is not http(s), the token is not a valid
/// header value, or the upgrade is refused (e.g. no valid session).
pub async fn subscribe(base_url: &str, access_token: &str) -> Result<Subscription, RealtimeError> {
    let ws_url = websocket_url(base_url)?;

    let mut request = format!("{ws_url}{MESSAGES_FEED}").into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        HeaderValue::from_str(&format!("Bearer {access_token}"))?,
    );

    let (mut socket, _) = connect_async(request).await?;
    info!("Subscribed to realtime feed");

    let (tx, rows) = mpsc::channel(CHANNEL_CAPACITY);
    let reader = tokio::spawn(async move {
        while let Some(frame) = socket.next().await {
            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(err) => {
                    warn!(error = %err, "Realtime feed error");
                    break;
                }
            };

            let change: ChangeFrame = match serde_json::from_str(text.as_str()) {
                Ok(change) => change,
                Err(err) => {
                    debug!(error = %err, "Dropping malformed realtime frame");
                    continue;
                }
            };
            if change.event != "INSERT" || change.table != "messages" {
                debug!(event = %change.event, table = %change.table, "Ignoring unrelated change");
                continue;
            }

            if tx.send(change.new).await.is_err() {
                break;
            }
        }
        debug!("Realtime reader finished");
    });

    Ok(Subscription { rows, reader })
}

/// Maps `http(s)://host` to `ws(s)://host`.
fn websocket_url(base_url: &str) -> Result<String, RealtimeError> {
    let base_url = base_url.trim_end_matches('/');
    if let Some(rest) = base_url.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else {
        Err(RealtimeError::InvalidUrl(base_url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_url_maps_schemes() {
        assert_eq!(websocket_url("http://localhost:8080").unwrap(), "ws://localhost:8080");
        assert_eq!(
            websocket_url("https://chat.example.com/").unwrap(),
            "wss://chat.example.com"
        );
    }

    #[test]
    fn websocket_url_rejects_other_schemes() {
        assert!(matches!(
            websocket_url("ftp://example.com"),
            Err(RealtimeError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn subscribe_to_unreachable_server_fails() {
        let result = subscribe("http://127.0.0.1:1", "token").await;
        assert!(matches!(result, Err(RealtimeError::WebSocket(_))));
    }
}
