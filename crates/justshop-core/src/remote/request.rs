//! Request building shared by HTTP calls and the push channel handshake
//!
//! Everything here is computed from settings read at call time.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use super::error::RemoteError;
use crate::config::SettingsProvider;

/// Versioned API prefix
pub const API_VERSION: &str = "v1";

/// Push channel endpoint
pub const PUSH_CHANNEL_ENDPOINT: &str = "ws";

/// Point update endpoint
pub const UPDATE_ENDPOINT: &str = "update";

/// Bulk delete of checked items
pub const DELETE_CHECKED_ENDPOINT: &str = "delete-checked";

/// Full list fetch used by fallback polling
pub const CURRENT_ENDPOINT: &str = "current";

/// `{server_url}/v1/{endpoint}`
pub fn api_url(server_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}/{}",
        server_url.trim_end_matches('/'),
        API_VERSION,
        endpoint.trim_start_matches('/')
    )
}

/// WebSocket URL for the push channel
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` pass through.
pub fn push_channel_url(server_url: &str) -> Result<String, RemoteError> {
    let trimmed = server_url.trim();
    let (scheme, rest) = trimmed
        .split_once("://")
        .ok_or_else(|| RemoteError::InvalidUrl {
            url: server_url.to_string(),
            details: "missing scheme".to_string(),
        })?;

    let ws_scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(RemoteError::InvalidUrl {
                url: server_url.to_string(),
                details: format!("unsupported scheme '{}'", other),
            })
        }
    };

    if rest.is_empty() {
        return Err(RemoteError::InvalidUrl {
            url: server_url.to_string(),
            details: "missing host".to_string(),
        });
    }

    Ok(api_url(
        &format!("{}://{}", ws_scheme, rest),
        PUSH_CHANNEL_ENDPOINT,
    ))
}

/// `Basic base64(user:pass)` when both credentials are set
///
/// Returns `None` (anonymous) if either one is empty.
pub fn basic_auth_header(username: &str, password: &str) -> Option<String> {
    if username.is_empty() || password.is_empty() {
        return None;
    }
    let encoded = STANDARD.encode(format!("{}:{}", username, password));
    Some(format!("Basic {}", encoded))
}

/// Authorization header for the current credentials
pub fn authorization(settings: &dyn SettingsProvider) -> Option<String> {
    basic_auth_header(&settings.username(), &settings.password())
}
