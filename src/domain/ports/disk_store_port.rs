//! Port for the persistent tier of the image cache.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::entities::CacheKey;
use crate::domain::errors::CacheResult;

/// Stores encoded image bytes keyed by [`CacheKey`].
///
/// Read failures are reported as misses. Implementations must be thread-safe.
#[async_trait]
pub trait DiskStorePort: Send + Sync {
    /// Returns the stored bytes for `key`, or `None` on a miss or read failure.
    async fn read(&self, key: &CacheKey) -> Option<Vec<u8>>;

    /// Stores bytes for `key`, replacing any previous entry.
    async fn write(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()>;

    /// Removes the entry for `key` if present.
    async fn remove(&self, key: &CacheKey);

    /// Removes entries not accessed within `older_than`.
    /// Returns the number of entries removed.
    async fn remove_expired(&self, older_than: Duration) -> usize;

    /// Returns true if an entry exists for `key`.
    async fn contains(&self, key: &CacheKey) -> bool;

    /// Removes every entry.
    async fn clear(&self) -> CacheResult<()>;
}
