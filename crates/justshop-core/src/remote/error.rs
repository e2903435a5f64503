//! Remote error handling

use std::time::Duration;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors from the list server, over HTTP or the push channel
///
/// None of these are fatal: the engine logs them, flips the connectivity
/// signal and carries on with the local view.
#[derive(Error, Debug)]
pub enum RemoteError {
    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    ClientSetup(#[source] reqwest::Error),

    /// HTTP request failed before a response arrived
    #[error("Request to '{endpoint}' failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with something other than 200
    #[error("'{endpoint}' returned HTTP {status}")]
    Status { endpoint: String, status: u16 },

    /// WebSocket I/O or handshake failure
    #[error("Push channel error: {0}")]
    Channel(#[source] Box<tungstenite::Error>),

    /// Server closed the push channel
    #[error("Push channel closed by server{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Closed { reason: Option<String> },

    /// The other side accepted the connection but never finished answering
    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },

    /// Snapshot payload could not be decoded
    #[error("Malformed snapshot: {0}")]
    Protocol(#[from] serde_json::Error),

    /// Server URL can't be turned into a request
    #[error("Invalid server URL '{url}': {details}")]
    InvalidUrl { url: String, details: String },
}

impl RemoteError {
    /// Whether the server rejected our credentials
    ///
    /// Auth failures get no special retry treatment.
    pub fn is_auth(&self) -> bool {
        let status = match self {
            RemoteError::Status { status, .. } => *status,
            RemoteError::Channel(e) => match e.as_ref() {
                tungstenite::Error::Http(response) => response.status().as_u16(),
                _ => return false,
            },
            _ => return false,
        };
        status == 401 || status == 403
    }

    /// Whether the payload, not the connection, was at fault
    pub fn is_protocol(&self) -> bool {
        matches!(self, RemoteError::Protocol(_))
    }
}

impl From<tungstenite::Error> for RemoteError {
    fn from(error: tungstenite::Error) -> Self {
        RemoteError::Channel(Box::new(error))
    }
}
