//! Image cache orchestrator.
//!
//! Implements a three-tier lookup: Memory -> Disk -> Transport.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::entities::{CacheKey, CachedImage, ImageSource, LoadedImage};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{DiskStorePort, TransportPort};

use super::fetch_coordinator::FetchCoordinator;
use super::memory_cache::{
    CacheStats, DEFAULT_MAX_ENTRY_COUNT, DEFAULT_MAX_TOTAL_COST, MemoryImageCache,
};

/// Default age after which unused disk entries are removed.
pub const DEFAULT_DISK_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Configuration for the image cache.
#[derive(Debug, Clone)]
pub struct ImageCacheConfig {
    /// Memory cost budget.
    pub max_total_cost: u64,
    /// Maximum images held in memory.
    pub max_entry_count: usize,
    /// Disk entries not accessed within this window are removed on backgrounding.
    pub disk_retention: Duration,
}

impl Default for ImageCacheConfig {
    fn default() -> Self {
        Self {
            max_total_cost: DEFAULT_MAX_TOTAL_COST,
            max_entry_count: DEFAULT_MAX_ENTRY_COUNT,
            disk_retention: DEFAULT_DISK_RETENTION,
        }
    }
}

/// Public entry point for loading images.
///
/// Cheap to clone; clones share the same stores and in-flight table.
#[derive(Clone)]
pub struct ImageCache {
    memory: Arc<MemoryImageCache>,
    disk: Arc<dyn DiskStorePort>,
    transport: Arc<dyn TransportPort>,
    coordinator: FetchCoordinator<LoadedImage>,
    pending_writes: Arc<watch::Sender<usize>>,
    config: ImageCacheConfig,
}

impl std::fmt::Debug for ImageCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageCache")
            .field("config", &self.config)
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

impl ImageCache {
    /// Creates a cache over the given disk store and transport.
    #[must_use]
    pub fn new(
        config: ImageCacheConfig,
        disk: Arc<dyn DiskStorePort>,
        transport: Arc<dyn TransportPort>,
    ) -> Self {
        let memory = Arc::new(MemoryImageCache::new(
            config.max_total_cost,
            config.max_entry_count,
        ));
        Self {
            memory,
            disk,
            transport,
            coordinator: FetchCoordinator::new(),
            pending_writes: Arc::new(watch::channel(0).0),
            config,
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &ImageCacheConfig {
        &self.config
    }

    /// Returns the memory tier.
    #[must_use]
    pub fn memory(&self) -> &MemoryImageCache {
        &self.memory
    }

    /// Loads the decoded image for `url`.
    ///
    /// # Errors
    /// Returns a transport or decode failure. Disk failures are never returned.
    pub async fn image(&self, url: &str) -> CacheResult<Arc<CachedImage>> {
        self.load(url).await.map(|loaded| loaded.image)
    }

    /// Loads an image for `url`, reporting where it came from.
    ///
    /// # Errors
    /// Returns a transport or decode failure. Disk failures are never returned.
    pub async fn load(&self, url: &str) -> CacheResult<LoadedImage> {
        self.load_key(&CacheKey::from_url(url)).await
    }

    /// Loads an image by key, checking memory, then disk, then the transport.
    ///
    /// Dropping the future withdraws this caller's interest in a shared download.
    ///
    /// # Errors
    /// Returns a transport or decode failure. Disk failures are never returned.
    pub async fn load_key(&self, key: &CacheKey) -> CacheResult<LoadedImage> {
        if let Some(img) = self.memory.get(key) {
            return Ok(LoadedImage {
                key: key.clone(),
                image: img,
                source: ImageSource::MemoryCache,
            });
        }

        if let Some(img) = self.load_from_disk(key).await {
            self.memory.set(key.clone(), Arc::clone(&img));
            return Ok(LoadedImage {
                key: key.clone(),
                image: img,
                source: ImageSource::DiskCache,
            });
        }

        let memory = Arc::clone(&self.memory);
        let disk = Arc::clone(&self.disk);
        let transport = Arc::clone(&self.transport);
        let pending_writes = Arc::clone(&self.pending_writes);
        let fetch_key = key.clone();

        self.coordinator
            .fetch(key, move || async move {
                // A download that finished just before this one started has already filled memory.
                if let Some(image) = memory.peek(&fetch_key) {
                    return Ok(LoadedImage {
                        key: fetch_key,
                        image,
                        source: ImageSource::MemoryCache,
                    });
                }

                debug!(key = %fetch_key, "Downloading image");
                let bytes = transport.fetch(fetch_key.url()).await?;
                let image = decode(bytes.clone()).await?;

                memory.set(fetch_key.clone(), Arc::clone(&image));
                spawn_disk_write(disk, pending_writes, fetch_key.clone(), bytes);
                Ok(LoadedImage {
                    key: fetch_key,
                    image,
                    source: ImageSource::Network,
                })
            })
            .await
    }

    /// Starts loading `url` on a separate task.
    ///
    /// The returned handle must be cancelled before its owner reissues a
    /// request for a different image. Dropping it lets the load finish in the
    /// background.
    #[must_use]
    pub fn spawn_image(&self, url: &str) -> ImageHandle {
        self.spawn_key(CacheKey::from_url(url))
    }

    /// Starts loading `key` on a separate task.
    #[must_use]
    pub fn spawn_key(&self, key: CacheKey) -> ImageHandle {
        let cache = self.clone();
        let task_key = key.clone();
        let task = tokio::spawn(async move { cache.load_key(&task_key).await });
        ImageHandle { key, task }
    }

    /// Returns true if `key` is resident in memory or stored on disk.
    pub async fn is_cached(&self, key: &CacheKey) -> bool {
        self.memory.contains(key) || self.disk.contains(key).await
    }

    /// Returns true if `key` is resident in memory.
    #[must_use]
    pub fn is_in_memory(&self, key: &CacheKey) -> bool {
        self.memory.contains(key)
    }

    /// Handles a memory-pressure signal by dropping the memory tier. Disk is untouched.
    pub fn on_memory_pressure(&self) {
        let count = self.memory.len();
        self.memory.remove_all();
        info!(count = count, "Memory pressure, dropped in-memory images");
    }

    /// Handles the host entering the background by scheduling disk expiry.
    ///
    /// Returns immediately; the returned handle resolves to the number of
    /// removed entries and may be ignored.
    pub fn on_enter_background(&self) -> JoinHandle<usize> {
        let disk = Arc::clone(&self.disk);
        let retention = self.config.disk_retention;
        debug!(retention_secs = retention.as_secs(), "Scheduling disk cache expiry");

        tokio::spawn(async move {
            let removed = disk.remove_expired(retention).await;
            info!(removed = removed, "Removed expired disk cache entries");
            removed
        })
    }

    /// Waits until every disk write started so far has finished.
    ///
    /// Hosts call this before exiting so that downloaded images persist.
    pub async fn flush_disk_writes(&self) {
        let mut pending = self.pending_writes.subscribe();
        let _ = pending.wait_for(|count| *count == 0).await;
    }

    /// Clears memory and disk.
    pub async fn clear_all(&self) {
        self.memory.remove_all();
        if let Err(e) = self.disk.clear().await {
            warn!(error = %e, "Failed to clear disk cache");
        }
        info!("Cleared all image caches");
    }

    /// Returns memory cache statistics.
    #[must_use]
    pub fn memory_stats(&self) -> CacheStats {
        self.memory.stats()
    }

    /// Returns the number of downloads in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.coordinator.in_flight()
    }

    /// Returns the number of callers waiting on the download for `key`.
    #[must_use]
    pub fn waiters(&self, key: &CacheKey) -> usize {
        self.coordinator.waiters(key)
    }

    /// Reads and decodes a disk entry, removing it if it is corrupt.
    async fn load_from_disk(&self, key: &CacheKey) -> Option<Arc<CachedImage>> {
        let bytes = self.disk.read(key).await?;

        match decode(Bytes::from(bytes)).await {
            Ok(img) => {
                debug!(key = %key, "Decoded image from disk cache");
                Some(img)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt disk cache entry, removing");
                self.disk.remove(key).await;
                None
            }
        }
    }
}

/// Decodes bytes on the blocking pool.
async fn decode(bytes: Bytes) -> CacheResult<Arc<CachedImage>> {
    tokio::task::spawn_blocking(move || CachedImage::decode(&bytes))
        .await
        .map_err(|e| CacheError::decode(format!("Decode task failed: {e}")))?
        .map(Arc::new)
        .map_err(|e| CacheError::decode(format!("Failed to decode image: {e}")))
}

/// Persists downloaded bytes without making the caller wait.
fn spawn_disk_write(
    disk: Arc<dyn DiskStorePort>,
    pending_writes: Arc<watch::Sender<usize>>,
    key: CacheKey,
    bytes: Bytes,
) {
    pending_writes.send_modify(|count| *count += 1);
    let guard = PendingWrite(pending_writes);
    tokio::spawn(async move {
        let _guard = guard;
        if let Err(e) = disk.write(&key, &bytes).await {
            warn!(key = %key, error = %e, "Failed to cache to disk");
        }
    });
}

/// Decrements the pending write count when the write task ends.
struct PendingWrite(Arc<watch::Sender<usize>>);

impl Drop for PendingWrite {
    fn drop(&mut self) {
        self.0.send_modify(|count| *count -= 1);
    }
}

/// A cancellable image load running on its own task.
#[derive(Debug)]
pub struct ImageHandle {
    key: CacheKey,
    task: JoinHandle<CacheResult<LoadedImage>>,
}

impl ImageHandle {
    /// Returns the key being loaded.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Stops waiting for the image. A download shared with other callers keeps going.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Returns true if the load has finished or been cancelled.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the load.
    ///
    /// # Errors
    /// Returns the load failure, or [`CacheError::Cancelled`] if cancelled.
    pub async fn result(self) -> CacheResult<LoadedImage> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                if e.is_panic() {
                    warn!(key = %self.key, "Image load task panicked");
                }
                Err(CacheError::Cancelled)
            }
        }
    }
}
