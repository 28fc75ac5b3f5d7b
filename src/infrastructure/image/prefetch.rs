//! Speculative cache warming for images about to become visible.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::domain::entities::CacheKey;

use super::image_cache::ImageCache;

struct Prefetch {
    id: u64,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ActivePrefetches {
    tasks: HashMap<CacheKey, Prefetch>,
    next_id: u64,
}

/// Issues best-effort loads ahead of need and retracts them when the
/// upcoming window moves on.
///
/// Window updates may arrive from many tasks at once; the set of active
/// prefetches is updated under a single lock per call.
pub struct PrefetchScheduler {
    cache: ImageCache,
    active: Arc<Mutex<ActivePrefetches>>,
}

impl std::fmt::Debug for PrefetchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrefetchScheduler")
            .field("active", &self.active_count())
            .finish_non_exhaustive()
    }
}

impl PrefetchScheduler {
    /// Creates a scheduler that warms `cache`.
    #[must_use]
    pub fn new(cache: ImageCache) -> Self {
        Self {
            cache,
            active: Arc::new(Mutex::new(ActivePrefetches::default())),
        }
    }

    /// Replaces the upcoming window.
    ///
    /// Starts a prefetch for every key that is neither cached nor already
    /// prefetching, and cancels prefetches for keys no longer upcoming.
    /// Must be called from within a tokio runtime.
    pub fn update_visible_window<I>(&self, upcoming: I)
    where
        I: IntoIterator<Item = CacheKey>,
    {
        let mut seen = HashSet::new();
        let upcoming: Vec<CacheKey> = upcoming
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();

        let mut active = self.active.lock();

        active.tasks.retain(|key, prefetch| {
            if seen.contains(key) {
                true
            } else {
                prefetch.task.abort();
                debug!(key = %key, "Retracted prefetch");
                false
            }
        });

        for key in upcoming {
            if active.tasks.contains_key(&key) || self.cache.is_in_memory(&key) {
                continue;
            }

            let id = active.next_id;
            active.next_id += 1;
            let task = self.spawn_prefetch(key.clone(), id);
            active.tasks.insert(key, Prefetch { id, task });
        }
    }

    /// Cancels every active prefetch.
    pub fn cancel_all(&self) {
        let mut active = self.active.lock();
        let count = active.tasks.len();
        for (_, prefetch) in active.tasks.drain() {
            prefetch.task.abort();
        }
        if count > 0 {
            debug!(count = count, "Cancelled all prefetches");
        }
    }

    /// Returns true if `key` is being prefetched.
    #[must_use]
    pub fn is_prefetching(&self, key: &CacheKey) -> bool {
        self.active.lock().tasks.contains_key(key)
    }

    /// Returns the number of active prefetches.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().tasks.len()
    }

    /// Returns the keys being prefetched.
    #[must_use]
    pub fn active_keys(&self) -> Vec<CacheKey> {
        self.active.lock().tasks.keys().cloned().collect()
    }

    fn spawn_prefetch(&self, key: CacheKey, id: u64) -> JoinHandle<()> {
        let cache = self.cache.clone();
        let active = Arc::clone(&self.active);

        tokio::spawn(async move {
            if cache.is_cached(&key).await {
                trace!(key = %key, "Already cached, skipping prefetch");
            } else {
                match cache.load_key(&key).await {
                    Ok(_) => trace!(key = %key, "Prefetched image"),
                    Err(e) => debug!(key = %key, error = %e, "Prefetch failed"),
                }
            }

            let mut active = active.lock();
            if active.tasks.get(&key).is_some_and(|p| p.id == id) {
                active.tasks.remove(&key);
            }
        })
    }
}

impl Drop for PrefetchScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
