//! Port for fetching raw image bytes from a remote origin.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::TransportError;

/// Delivers encoded image bytes for a URL.
/// Timeouts are the transport's responsibility and surface as
/// [`TransportError::Timeout`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TransportPort: Send + Sync {
    /// Fetches the bytes behind `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, TransportError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;

    use parking_lot::Mutex;
    use tokio::sync::watch;

    /// Encodes a blank RGBA image of the given size as PNG.
    pub fn png_bytes(width: u32, height: u32) -> Bytes {
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::new_rgba8(width, height)
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("encode test png");
        Bytes::from(buf.into_inner())
    }

    /// Scripted transport that counts calls and can hold requests open.
    pub struct StubTransport {
        responses: Mutex<HashMap<String, Result<Bytes, TransportError>>>,
        calls: Mutex<HashMap<String, usize>>,
        gate: Option<watch::Receiver<bool>>,
    }

    impl StubTransport {
        /// Creates a transport that answers immediately.
        pub fn new() -> Self {
            Self {
                responses: Mutex::new(HashMap::new()),
                calls: Mutex::new(HashMap::new()),
                gate: None,
            }
        }

        /// Creates a transport whose requests block until `true` is sent on the gate.
        pub fn gated() -> (Self, watch::Sender<bool>) {
            let (tx, rx) = watch::channel(false);
            let mut transport = Self::new();
            transport.gate = Some(rx);
            (transport, tx)
        }

        /// Serves `bytes` for `url`.
        pub fn respond(&self, url: &str, bytes: Bytes) {
            self.responses.lock().insert(url.to_string(), Ok(bytes));
        }

        /// Fails every request for `url` with `error`.
        pub fn fail(&self, url: &str, error: TransportError) {
            self.responses.lock().insert(url.to_string(), Err(error));
        }

        /// Total number of fetches started.
        pub fn calls(&self) -> usize {
            self.calls.lock().values().sum()
        }

        /// Number of fetches started for `url`.
        pub fn calls_for(&self, url: &str) -> usize {
            self.calls.lock().get(url).copied().unwrap_or(0)
        }
    }

    impl Default for StubTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl TransportPort for StubTransport {
        async fn fetch(&self, url: &str) -> Result<Bytes, TransportError> {
            *self.calls.lock().entry(url.to_string()).or_insert(0) += 1;

            if let Some(gate) = &self.gate {
                let mut gate = gate.clone();
                if gate.wait_for(|open| *open).await.is_err() {
                    return Err(TransportError::network("gate dropped"));
                }
            }

            self.responses
                .lock()
                .get(url)
                .cloned()
                .unwrap_or(Err(TransportError::Http { status: 404 }))
        }
    }
}
