//! Image cache error types.

use thiserror::Error;

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Failures reported by a [`TransportPort`](crate::domain::ports::TransportPort).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[allow(missing_docs)]
pub enum TransportError {
    #[error("HTTP {status}")]
    Http { status: u16 },

    #[error("request failed: {0}")]
    Network(String),

    #[error("request timed out")]
    Timeout,
}

impl TransportError {
    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}

/// Errors that can occur while loading an image.
///
/// Cloneable so a single outcome can be delivered to every caller waiting on
/// the same in-flight request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The transport failed to deliver the image bytes.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// The bytes could not be decoded into an image.
    #[error("decode error: {0}")]
    Decode(String),
    /// Local storage failure. Absorbed by the cache, never returned from a load.
    #[error("IO error: {0}")]
    Io(String),
    /// The caller stopped waiting, or every caller of a shared fetch did.
    #[error("request cancelled")]
    Cancelled,
}

impl CacheError {
    /// Creates a decode error.
    #[must_use]
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode(message.into())
    }

    /// Creates an IO error.
    #[must_use]
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }

    /// Returns true if this is a cancellation rather than a failure.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
