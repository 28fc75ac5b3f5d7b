//! Disk-based image cache for persistence across sessions.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::domain::entities::CacheKey;
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::DiskStorePort;

const FILE_EXTENSION: &str = "img";
const TEMP_PREFIX: &str = ".write-";
const TEMP_EXTENSION: &str = "part";

/// Disk-based image cache that persists raw image bytes.
///
/// One file per key, named after a hash of the key. Files are written to a
/// temporary name and renamed into place. There is no size bound: entries
/// stay until [`DiskStorePort::remove_expired`] or [`DiskStorePort::clear`]
/// removes them. Writes, removals and expiry passes are serialized so the
/// size and count stay in step with the directory.
pub struct DiskImageCache {
    cache_dir: PathBuf,
    current_size: AtomicU64,
    item_count: AtomicUsize,
    mutation: Mutex<()>,
}

impl DiskImageCache {
    /// Creates a new disk cache in the specified directory.
    ///
    /// # Errors
    /// Returns error if cache directory cannot be created or read.
    pub async fn new(cache_dir: PathBuf) -> CacheResult<Self> {
        fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to create cache dir: {e}")))?;
        let mut total_size = 0u64;
        let mut count = 0usize;

        let mut entries = fs::read_dir(&cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to read cache dir: {e}")))?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            if is_cache_file(&entry.path())
                && let Ok(meta) = entry.metadata().await
            {
                total_size += meta.len();
                count += 1;
            }
        }

        debug!(
            path = %cache_dir.display(),
            files = count,
            bytes = total_size,
            "Opened disk image cache"
        );

        Ok(Self {
            cache_dir,
            current_size: AtomicU64::new(total_size),
            item_count: AtomicUsize::new(count),
            mutation: Mutex::new(()),
        })
    }

    /// Returns the directory holding the cache files.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Returns the path for a cached image.
    fn cache_path(&self, key: &CacheKey) -> PathBuf {
        self.cache_dir
            .join(format!("{}.{FILE_EXTENSION}", key.file_stem()))
    }

    /// Returns the current cache size in bytes.
    pub fn current_size(&self) -> u64 {
        self.current_size.load(Ordering::Relaxed)
    }

    /// Returns the number of cached files.
    pub fn len(&self) -> usize {
        self.item_count.load(Ordering::Relaxed)
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record_removal(&self, size: u64) {
        let _ = self
            .current_size
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |total| {
                Some(total.saturating_sub(size))
            });
        let _ = self
            .item_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |count| {
                Some(count.saturating_sub(1))
            });
    }
}

#[async_trait]
impl DiskStorePort for DiskImageCache {
    async fn read(&self, key: &CacheKey) -> Option<Vec<u8>> {
        let path = self.cache_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                trace!(key = %key, path = %path.display(), "Disk cache hit");
                touch(&path).await;
                Some(bytes)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                trace!(key = %key, "Disk cache miss");
                None
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read disk cache entry");
                None
            }
        }
    }

    async fn write(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        let path = self.cache_path(key);
        let dir = self.cache_dir.clone();
        let data = bytes.to_vec();
        let target = path.clone();

        let _mutation = self.mutation.lock().await;
        let old_size = tokio::task::spawn_blocking(move || -> std::io::Result<Option<u64>> {
            let old_size = std::fs::metadata(&target).map(|m| m.len()).ok();
            let mut temp_file = tempfile::Builder::new()
                .prefix(TEMP_PREFIX)
                .suffix(&format!(".{TEMP_EXTENSION}"))
                .tempfile_in(&dir)?;
            temp_file.write_all(&data)?;
            temp_file.persist(&target).map_err(|e| e.error)?;
            Ok(old_size)
        })
        .await
        .map_err(|e| CacheError::io(format!("Write task failed: {e}")))?
        .map_err(|e| CacheError::io(format!("Failed to write cache file: {e}")))?;

        let new_size = bytes.len() as u64;
        if let Some(old) = old_size {
            if new_size > old {
                self.current_size
                    .fetch_add(new_size - old, Ordering::Relaxed);
            } else {
                self.current_size
                    .fetch_sub(old - new_size, Ordering::Relaxed);
            }
        } else {
            self.current_size.fetch_add(new_size, Ordering::Relaxed);
            self.item_count.fetch_add(1, Ordering::Relaxed);
        }

        debug!(key = %key, path = %path.display(), size = bytes.len(), "Stored image in disk cache");
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) {
        let path = self.cache_path(key);
        let _mutation = self.mutation.lock().await;
        let size = fs::metadata(&path).await.map(|m| m.len()).ok();
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(key = %key, error = %e, "Failed to remove disk cache entry");
            }
        } else if let Some(s) = size {
            self.record_removal(s);
            debug!(key = %key, "Removed image from disk cache");
        }
    }

    async fn remove_expired(&self, older_than: Duration) -> usize {
        let Some(cutoff) = SystemTime::now().checked_sub(older_than) else {
            return 0;
        };

        let _mutation = self.mutation.lock().await;
        let mut entries = match fs::read_dir(&self.cache_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to scan disk cache for expired entries");
                return 0;
            }
        };

        let mut removed = 0usize;
        let mut abandoned = 0usize;
        let mut freed = 0u64;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let cache_file = is_cache_file(&path);
            if !cache_file && !is_temp_file(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let last_access = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            if last_access >= cutoff {
                continue;
            }

            if let Err(e) = fs::remove_file(&path).await {
                warn!(path = %path.display(), error = %e, "Failed to remove expired cache file");
            } else if cache_file {
                self.record_removal(meta.len());
                removed += 1;
                freed += meta.len();
            } else {
                abandoned += 1;
            }
        }

        debug!(
            removed = removed,
            abandoned_writes = abandoned,
            freed_bytes = freed,
            retention_secs = older_than.as_secs(),
            "Disk cache expiry pass complete"
        );
        removed
    }

    async fn contains(&self, key: &CacheKey) -> bool {
        fs::try_exists(self.cache_path(key)).await.unwrap_or(false)
    }

    async fn clear(&self) -> CacheResult<()> {
        let _mutation = self.mutation.lock().await;
        let mut entries = fs::read_dir(&self.cache_dir)
            .await
            .map_err(|e| CacheError::io(format!("Failed to read cache dir: {e}")))?;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| CacheError::io(format!("Failed to read entry: {e}")))?
        {
            let path = entry.path();
            if (is_cache_file(&path) || is_temp_file(&path))
                && fs::remove_file(&path).await.is_err()
            {
                warn!(path = %path.display(), "Failed to remove cache file");
            }
        }
        self.current_size.store(0, Ordering::Relaxed);
        self.item_count.store(0, Ordering::Relaxed);
        debug!("Cleared disk cache");
        Ok(())
    }
}

fn is_cache_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == FILE_EXTENSION)
}

/// Matches temporary files left behind by writes that never completed.
fn is_temp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TEMP_EXTENSION)
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(TEMP_PREFIX))
}

/// Marks a file as recently accessed by bumping its modification time.
async fn touch(path: &Path) {
    let path = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || {
        std::fs::File::options()
            .write(true)
            .open(&path)
            .and_then(|file| file.set_modified(SystemTime::now()))
    })
    .await;

    if let Ok(Err(e)) = result {
        trace!(error = %e, "Failed to refresh cache file access time");
    }
}

/// Returns the default cache directory path.
#[must_use]
pub fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "cinecache").map_or_else(
        || {
            std::env::temp_dir()
                .join("cinecache")
                .join("cache")
                .join("images")
        },
        |dirs| dirs.cache_dir().join("images"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn create_test_cache() -> (DiskImageCache, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskImageCache::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        (cache, temp_dir)
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_url(&format!("https://example.com/{name}.jpg"))
    }

    fn backdate(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let (cache, _temp) = create_test_cache().await;
        let data = b"test image data";

        cache.write(&key("a"), data).await.unwrap();
        let retrieved = cache.read(&key("a")).await;

        assert_eq!(retrieved.unwrap(), data);
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let (cache, _temp) = create_test_cache().await;
        assert!(cache.read(&key("nonexistent")).await.is_none());
    }

    #[tokio::test]
    async fn test_file_name_is_hashed() {
        let (cache, temp) = create_test_cache().await;
        let key = CacheKey::from_url("https://example.com/posters/w500/a?b=c&d=e");

        cache.write(&key, b"data").await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec![format!("{}.img", key.file_stem())]);
    }

    #[tokio::test]
    async fn test_remove() {
        let (cache, _temp) = create_test_cache().await;

        cache.write(&key("a"), b"test").await.unwrap();
        assert!(cache.contains(&key("a")).await);

        cache.remove(&key("a")).await;
        assert!(!cache.contains(&key("a")).await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _temp) = create_test_cache().await;

        cache.write(&key("a"), b"data1").await.unwrap();
        cache.write(&key("b"), b"data2").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.clear().await.unwrap();
        assert_eq!(cache.len(), 0);
        assert!(!cache.contains(&key("a")).await);
    }

    #[tokio::test]
    async fn test_atomic_counters_sync() {
        let (cache, _temp) = create_test_cache().await;

        assert_eq!(cache.current_size(), 0);

        cache.write(&key("a"), b"hello").await.unwrap();
        cache.write(&key("b"), b"world!").await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 11);

        cache.write(&key("a"), b"hey").await.unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.current_size(), 9);

        cache.remove(&key("b")).await;
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 3);
    }

    #[tokio::test]
    async fn test_counters_restored_on_open() {
        let temp_dir = TempDir::new().unwrap();
        {
            let cache = DiskImageCache::new(temp_dir.path().to_path_buf())
                .await
                .unwrap();
            cache.write(&key("a"), b"12345").await.unwrap();
        }

        let reopened = DiskImageCache::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.current_size(), 5);
        assert_eq!(reopened.read(&key("a")).await.unwrap(), b"12345");
    }

    #[tokio::test]
    async fn test_remove_expired_keeps_recent_entries() {
        let (cache, _temp) = create_test_cache().await;
        let week = Duration::from_secs(7 * 24 * 60 * 60);

        cache.write(&key("old"), b"old").await.unwrap();
        cache.write(&key("fresh"), b"fresh").await.unwrap();
        backdate(&cache.cache_path(&key("old")), week * 2);

        let removed = cache.remove_expired(week).await;

        assert_eq!(removed, 1);
        assert!(!cache.contains(&key("old")).await);
        assert!(cache.contains(&key("fresh")).await);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_read_refreshes_access_time() {
        let (cache, _temp) = create_test_cache().await;
        let week = Duration::from_secs(7 * 24 * 60 * 60);

        cache.write(&key("a"), b"data").await.unwrap();
        backdate(&cache.cache_path(&key("a")), week * 2);

        assert!(cache.read(&key("a")).await.is_some());

        assert_eq!(cache.remove_expired(week).await, 0);
        assert!(cache.contains(&key("a")).await);
    }

    #[tokio::test]
    async fn test_stale_partial_writes_are_expired() {
        let (cache, temp) = create_test_cache().await;
        let week = Duration::from_secs(7 * 24 * 60 * 60);
        let stale = temp.path().join(".write-a1b2c3.part");
        let recent = temp.path().join(".write-d4e5f6.part");
        std::fs::write(&stale, b"partial").unwrap();
        std::fs::write(&recent, b"partial").unwrap();
        backdate(&stale, week * 2);
        cache.write(&key("a"), b"data").await.unwrap();

        let removed = cache.remove_expired(week).await;

        assert_eq!(removed, 0);
        assert!(!stale.exists());
        assert!(recent.exists());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_removes_partial_writes() {
        let (cache, temp) = create_test_cache().await;
        let partial = temp.path().join(".write-a1b2c3.part");
        std::fs::write(&partial, b"partial").unwrap();

        cache.clear().await.unwrap();

        assert!(!partial.exists());
    }

    #[tokio::test]
    async fn test_partial_writes_not_counted_on_open() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(".write-a1b2c3.part"), b"partial").unwrap();

        let cache = DiskImageCache::new(temp_dir.path().to_path_buf())
            .await
            .unwrap();

        assert!(cache.is_empty());
        assert_eq!(cache.current_size(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_to_one_key_count_once() {
        let (cache, _temp) = create_test_cache().await;
        let cache = std::sync::Arc::new(cache);

        let writes: Vec<_> = (0..16)
            .map(|_| {
                let cache = std::sync::Arc::clone(&cache);
                tokio::spawn(async move { cache.write(&key("a"), b"poster").await })
            })
            .collect();
        for write in writes {
            write.await.unwrap().unwrap();
        }

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.current_size(), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_clear_racing_writes_keeps_counters_consistent() {
        let (cache, temp) = create_test_cache().await;
        let cache = std::sync::Arc::new(cache);

        let writes: Vec<_> = (0..8)
            .map(|i| {
                let cache = std::sync::Arc::clone(&cache);
                tokio::spawn(async move { cache.write(&key(&i.to_string()), b"poster").await })
            })
            .collect();
        cache.clear().await.unwrap();
        for write in writes {
            write.await.unwrap().unwrap();
        }
        cache.remove(&key("0")).await;

        let on_disk = std::fs::read_dir(temp.path())
            .unwrap()
            .filter(|e| is_cache_file(&e.as_ref().unwrap().path()))
            .count();
        assert_eq!(cache.len(), on_disk);
        assert_eq!(cache.current_size(), on_disk as u64 * 6);
    }

    #[tokio::test]
    async fn test_write_into_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("images");
        let cache = DiskImageCache::new(dir.clone()).await.unwrap();
        std::fs::remove_dir_all(&dir).unwrap();

        let result = cache.write(&key("a"), b"data").await;

        assert!(matches!(result, Err(CacheError::Io(_))));
        assert!(cache.read(&key("a")).await.is_none());
    }
}
