//! HTTP implementation of [`Remote`]
//!
//! Server URL and credentials are read from the settings provider on every
//! call. Failures are logged here and returned to the caller, which decides
//! whether to queue a retry.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{RequestBuilder, StatusCode};
use tracing::{debug, info, warn};

use super::channel;
use super::error::RemoteError;
use super::request::{
    api_url, authorization, CURRENT_ENDPOINT, DELETE_CHECKED_ENDPOINT, UPDATE_ENDPOINT,
};
use super::{PushChannel, Remote};
use crate::config::SettingsProvider;
use crate::models::{Item, Snapshot};

/// Request timeout in seconds
const REQUEST_TIMEOUT: u64 = 10;

/// List server client over HTTP and WebSocket
pub struct HttpRemote {
    client: reqwest::Client,
    settings: Arc<dyn SettingsProvider>,
}

impl HttpRemote {
    /// Create a client that reads server URL and credentials from `settings`
    pub fn new(settings: Arc<dyn SettingsProvider>) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT))
            .user_agent(concat!("justshop/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RemoteError::ClientSetup)?;

        Ok(Self { client, settings })
    }

    fn url(&self, endpoint: &str) -> String {
        api_url(&self.settings.server_url(), endpoint)
    }

    /// Attach basic auth when both credentials are set
    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match authorization(self.settings.as_ref()) {
            Some(value) => request.header(AUTHORIZATION, value),
            None => request,
        }
    }

    /// Send a request and require HTTP 200
    async fn send(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<reqwest::Response, RemoteError> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|source| RemoteError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(RemoteError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn delete(&self, endpoint: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.url(endpoint));
        match self.send(endpoint, request).await {
            Ok(_) => {
                debug!("DELETE {} ok", endpoint);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to call {}: {}", endpoint, e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Remote for HttpRemote {
    async fn apply_update(&self, item: &Item) -> Result<(), RemoteError> {
        let request = self.client.post(self.url(UPDATE_ENDPOINT)).json(item);
        match self.send(UPDATE_ENDPOINT, request).await {
            Ok(_) => {
                debug!("Pushed item {}", item.id);
                Ok(())
            }
            Err(e) => {
                warn!("Failed to call update for item {}: {}", item.id, e);
                Err(e)
            }
        }
    }

    async fn delete_checked(&self) -> Result<(), RemoteError> {
        self.delete(DELETE_CHECKED_ENDPOINT).await
    }

    async fn delete_all(&self) -> Result<(), RemoteError> {
        let endpoint = self.settings.delete_all_endpoint();
        self.delete(&endpoint).await
    }

    async fn fetch_snapshot(&self) -> Result<Snapshot, RemoteError> {
        let request = self.client.get(self.url(CURRENT_ENDPOINT));
        let response = self.send(CURRENT_ENDPOINT, request).await?;
        let body = response
            .text()
            .await
            .map_err(|source| RemoteError::Transport {
                endpoint: CURRENT_ENDPOINT.to_string(),
                source,
            })?;

        let snapshot = Snapshot::from_json(&body)?;
        debug!("Fetched snapshot with {} items", snapshot.len());
        Ok(snapshot)
    }

    async fn open_push_channel(&self) -> Result<PushChannel, RemoteError> {
        let server_url = self.settings.server_url();
        info!("Opening push channel to {}", server_url);
        channel::open(&server_url, authorization(self.settings.as_ref())).await
    }
}
