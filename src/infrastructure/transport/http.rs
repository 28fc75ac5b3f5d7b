//! HTTP transport backed by reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing::{debug, trace};

use crate::domain::errors::TransportError;
use crate::domain::ports::TransportPort;

const DEFAULT_USER_AGENT: &str = concat!("cinecache/", env!("CARGO_PKG_VERSION"));

/// Configuration for the HTTP transport.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    /// Request timeout.
    pub timeout: Duration,
    /// Maximum concurrent downloads.
    pub max_concurrent_downloads: usize,
    /// User agent sent with every request.
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_concurrent_downloads: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// Downloads image bytes over HTTP(S), bounding concurrent requests.
pub struct HttpTransport {
    client: Client,
    permits: Arc<Semaphore>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport with the given configuration.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &HttpTransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            permits: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
        })
    }
}

#[async_trait]
impl TransportPort for HttpTransport {
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TransportError::network(format!("Download slots closed: {e}")))?;

        trace!(url = %url, "Sending image request");
        let response = self.client.get(url).send().await.map_err(map_error)?;

        let status = response.status();
        if !status.is_success() {
            debug!(url = %url, status = %status, "Image request rejected");
            return Err(TransportError::Http {
                status: status.as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(map_error)?;
        debug!(url = %url, size = bytes.len(), "Downloaded image");
        Ok(bytes)
    }
}

fn map_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::network(e.to_string())
    }
}
