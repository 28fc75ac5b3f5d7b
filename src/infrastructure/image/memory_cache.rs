//! In-memory LRU image cache with cost and count budgets.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, CachedImage};

/// Default cost budget (30 MB of decoded RGBA pixels).
pub const DEFAULT_MAX_TOTAL_COST: u64 = 30 * 1024 * 1024;

/// Default maximum number of images to cache in memory.
pub const DEFAULT_MAX_ENTRY_COUNT: usize = 50;

struct Entries {
    lru: LruCache<CacheKey, Arc<CachedImage>>,
    total_cost: u64,
}

/// In-memory LRU cache for decoded images.
///
/// Every insert is followed by an eviction pass that drops least-recently
/// used entries until both the cost and the count budget hold. Lookups are
/// synchronous and never touch I/O.
pub struct MemoryImageCache {
    entries: Mutex<Entries>,
    max_total_cost: u64,
    max_entry_count: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache with the given budgets. A zero entry count is treated as one.
    #[must_use]
    pub fn new(max_total_cost: u64, max_entry_count: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                total_cost: 0,
            }),
            max_total_cost,
            max_entry_count: max_entry_count.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a new cache with the default budgets.
    #[must_use]
    pub fn with_default_limits() -> Self {
        Self::new(DEFAULT_MAX_TOTAL_COST, DEFAULT_MAX_ENTRY_COUNT)
    }

    /// Gets an image and marks it as most recently used.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CachedImage>> {
        let mut entries = self.entries.lock();
        if let Some(img) = entries.lru.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(Arc::clone(img))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    /// Peeks at an image without promoting it in the LRU or touching stats.
    pub fn peek(&self, key: &CacheKey) -> Option<Arc<CachedImage>> {
        self.entries.lock().lru.peek(key).cloned()
    }

    /// Returns true if `key` is resident.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.lock().lru.contains(key)
    }

    /// Stores an image, then evicts until within budget.
    ///
    /// An image whose cost alone exceeds the cost budget is not cached.
    /// Returns true if the image was stored.
    pub fn set(&self, key: CacheKey, image: Arc<CachedImage>) -> bool {
        let cost = image.cost();
        if cost > self.max_total_cost {
            debug!(
                key = %key,
                cost = cost,
                max_total_cost = self.max_total_cost,
                "Image exceeds memory budget, not caching"
            );
            return false;
        }

        let mut entries = self.entries.lock();
        debug!(key = %key, cost = cost, "Storing image in memory cache");
        if let Some(previous) = entries.lru.put(key, image) {
            entries.total_cost -= previous.cost();
        }
        entries.total_cost += cost;

        while entries.total_cost > self.max_total_cost || entries.lru.len() > self.max_entry_count
        {
            let Some((evicted, img)) = entries.lru.pop_lru() else {
                break;
            };
            entries.total_cost -= img.cost();
            debug!(key = %evicted, cost = img.cost(), "Evicted image from memory cache");
        }

        true
    }

    /// Removes a single image.
    pub fn remove(&self, key: &CacheKey) {
        let mut entries = self.entries.lock();
        if let Some(img) = entries.lru.pop(key) {
            entries.total_cost -= img.cost();
            debug!(key = %key, "Removed image from memory cache");
        }
    }

    /// Drops every resident image.
    pub fn remove_all(&self) {
        let mut entries = self.entries.lock();
        let count = entries.lru.len();
        entries.lru.clear();
        entries.total_cost = 0;
        debug!(count = count, "Cleared memory image cache");
    }

    /// Returns the number of resident images.
    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    /// Returns true if no images are resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the summed cost of resident images.
    pub fn total_cost(&self) -> u64 {
        self.entries.lock().total_cost
    }

    /// Returns the cost budget.
    #[must_use]
    pub const fn max_total_cost(&self) -> u64 {
        self.max_total_cost
    }

    /// Returns the entry count budget.
    #[must_use]
    pub const fn max_entry_count(&self) -> usize {
        self.max_entry_count
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let (size, total_cost) = {
            let entries = self.entries.lock();
            (entries.lru.len(), entries.total_cost)
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            size,
            total_cost,
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::with_default_limits()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Summed cost of cached images.
    pub total_cost: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images ({} cost units), {:.1}% hit rate ({} hits, {} misses)",
            self.size, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(width: u32, height: u32) -> Arc<CachedImage> {
        Arc::new(CachedImage::new(image::DynamicImage::new_rgba8(
            width, height,
        )))
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::from_url(&format!("https://example.com/{name}.jpg"))
    }

    #[test]
    fn test_cache_set_and_get() {
        let cache = MemoryImageCache::new(1_000_000, 10);
        cache.set(key("a"), test_image(100, 100));

        let retrieved = cache.get(&key("a"));
        assert_eq!(retrieved.unwrap().width(), 100);
        assert_eq!(cache.total_cost(), 40_000);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::with_default_limits();
        assert!(cache.get(&key("missing")).is_none());
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let cache = MemoryImageCache::new(u64::MAX, 2);

        cache.set(key("a"), test_image(1, 1));
        cache.set(key("b"), test_image(1, 1));
        assert!(cache.get(&key("a")).is_some());
        cache.set(key("c"), test_image(1, 1));

        assert!(cache.contains(&key("a")));
        assert!(!cache.contains(&key("b")));
        assert!(cache.contains(&key("c")));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(u64::MAX, 2);

        cache.set(key("a"), test_image(1, 1));
        cache.set(key("b"), test_image(1, 1));
        let _ = cache.peek(&key("a"));
        cache.set(key("c"), test_image(1, 1));

        assert!(cache.peek(&key("a")).is_none());
        assert!(cache.peek(&key("b")).is_some());
    }

    #[test]
    fn test_cost_budget_evicts_oldest() {
        let cache = MemoryImageCache::new(2_000_000, 50);

        cache.set(key("a"), test_image(512, 512));
        assert_eq!(cache.total_cost(), 1_048_576);

        cache.set(key("b"), test_image(512, 512));

        assert!(!cache.contains(&key("a")));
        assert!(cache.contains(&key("b")));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 1_048_576);
    }

    #[test]
    fn test_large_insert_evicts_several() {
        let cache = MemoryImageCache::new(1_000, 50);
        for name in ["a", "b", "c", "d"] {
            cache.set(key(name), test_image(10, 5));
        }
        assert_eq!(cache.total_cost(), 800);

        cache.set(key("big"), test_image(20, 10));

        assert_eq!(cache.len(), 2);
        assert!(cache.contains(&key("d")));
        assert!(cache.contains(&key("big")));
        assert_eq!(cache.total_cost(), 1_000);
    }

    #[test]
    fn test_oversized_image_rejected() {
        let cache = MemoryImageCache::new(100, 10);
        cache.set(key("small"), test_image(5, 5));

        assert!(!cache.set(key("huge"), test_image(10, 10)));

        assert!(!cache.contains(&key("huge")));
        assert!(cache.contains(&key("small")));
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_replacement_updates_cost() {
        let cache = MemoryImageCache::new(u64::MAX, 10);
        cache.set(key("a"), test_image(10, 10));
        cache.set(key("a"), test_image(5, 5));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_cost(), 100);
    }

    #[test]
    fn test_budgets_hold_after_every_set() {
        let cache = MemoryImageCache::new(50_000, 7);
        let sizes = [(10, 10), (100, 100), (50, 60), (1, 1), (111, 112), (30, 30)];

        for i in 0..200u32 {
            let (w, h) = sizes[i as usize % sizes.len()];
            cache.set(key(&format!("img{}", i % 23)), test_image(w, h));
            if i % 3 == 0 {
                let _ = cache.get(&key(&format!("img{}", (i * 7) % 23)));
            }

            assert!(cache.total_cost() <= 50_000);
            assert!(cache.len() <= 7);
        }
    }

    #[test]
    fn test_remove_all() {
        let cache = MemoryImageCache::with_default_limits();
        cache.set(key("a"), test_image(10, 10));
        cache.set(key("b"), test_image(10, 10));

        cache.remove_all();

        assert!(cache.is_empty());
        assert_eq!(cache.total_cost(), 0);
    }

    #[test]
    fn test_remove_single() {
        let cache = MemoryImageCache::with_default_limits();
        cache.set(key("a"), test_image(10, 10));
        cache.set(key("b"), test_image(10, 10));

        cache.remove(&key("a"));

        assert!(!cache.contains(&key("a")));
        assert_eq!(cache.total_cost(), 400);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::with_default_limits();
        cache.set(key("a"), test_image(10, 10));

        let _ = cache.get(&key("a"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.total_cost, 400);
        assert!((stats.hit_rate - 50.0).abs() < f64::EPSILON);
    }
}
