//! Cache key derived from an image's source URL.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept for on-disk file names (128 bits).
const FILE_STEM_BYTES: usize = 16;

/// Stable identifier for a cached image.
///
/// The key is the source URL with surrounding whitespace removed, so it can
/// always be turned back into a request for the transport. Use
/// [`CacheKey::file_stem`] wherever a filesystem-safe name is needed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Creates a key from a source URL.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        Self(url.trim().to_string())
    }

    /// Returns the source URL this key was derived from.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.0
    }

    /// Returns a hex-encoded, truncated SHA-256 of the key.
    #[must_use]
    pub fn file_stem(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let digest = hasher.finalize();
        hex::encode(&digest[..FILE_STEM_BYTES])
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::from_url(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::from_url(&s)
    }
}
