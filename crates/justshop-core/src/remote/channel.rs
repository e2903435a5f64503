//! WebSocket push channel
//!
//! The server pushes the whole list as a text frame after every change.
//! Nothing is ever written by the client.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use super::error::RemoteError;
use super::request::push_channel_url;
use super::{ChannelEvent, PushChannel};
use crate::models::Snapshot;

/// Buffered snapshots between the reader task and the engine
const EVENT_BUFFER: usize = 16;

/// Same budget as an HTTP request
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect and start forwarding snapshots
///
/// Resolves once the WebSocket handshake completes, or fails with
/// [`RemoteError::Timeout`] if it takes longer than ten seconds.
pub(super) async fn open(
    server_url: &str,
    authorization: Option<String>,
) -> Result<PushChannel, RemoteError> {
    open_within(server_url, authorization, HANDSHAKE_TIMEOUT).await
}

async fn open_within(
    server_url: &str,
    authorization: Option<String>,
    handshake_timeout: Duration,
) -> Result<PushChannel, RemoteError> {
    let url = push_channel_url(server_url)?;
    let mut request = url.as_str().into_client_request()?;

    if let Some(value) = authorization {
        let value = HeaderValue::from_str(&value).map_err(|e| RemoteError::InvalidUrl {
            url: url.clone(),
            details: format!("credentials can't be sent as a header: {}", e),
        })?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    let (ws_stream, _response) = timeout(handshake_timeout, connect_async(request))
        .await
        .map_err(|_| RemoteError::Timeout {
            what: "push channel handshake",
            after: handshake_timeout,
        })??;
    info!("Push channel open: {}", url);

    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let reader = tokio::spawn(async move {
        let mut ws_stream = ws_stream;
        let reason = loop {
            let decoded = match ws_stream.next().await {
                Some(Ok(Message::Text(text))) => Snapshot::from_json(&text),
                Some(Ok(Message::Binary(data))) => Snapshot::from_slice(&data),
                Some(Ok(Message::Close(frame))) => {
                    break RemoteError::Closed {
                        reason: frame
                            .map(|f| f.reason.into_owned())
                            .filter(|r| !r.is_empty()),
                    };
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => break RemoteError::from(e),
                None => break RemoteError::Closed { reason: None },
            };

            match decoded {
                Ok(snapshot) => {
                    debug!("Push channel delivered {} items", snapshot.len());
                    if tx.send(ChannelEvent::Snapshot(snapshot)).await.is_err() {
                        // Nobody is listening any more
                        return;
                    }
                }
                Err(e) => {
                    warn!("Undecodable push frame: {}", e);
                    break RemoteError::from(e);
                }
            }
        };

        info!("Push channel lost: {}", reason);
        let _ = tx.send(ChannelEvent::Lost(reason)).await;
    });

    Ok(PushChannel::new(rx, Some(reader)))
}
