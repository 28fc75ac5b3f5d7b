//! Image caching infrastructure.
//!
//! This module provides:
//! - Memory caching with cost-bounded LRU eviction
//! - Disk caching for persistence
//! - Shared, cancellable downloads per key
//! - Prefetching ahead of the visible window

pub mod disk_cache;
pub mod fetch_coordinator;
pub mod image_cache;
pub mod lifecycle;
pub mod memory_cache;
pub mod prefetch;

pub use disk_cache::{DiskImageCache, default_cache_dir};
pub use fetch_coordinator::{FetchCoordinator, FetchTicket};
pub use image_cache::{DEFAULT_DISK_RETENTION, ImageCache, ImageCacheConfig, ImageHandle};
pub use lifecycle::{LifecycleEvent, spawn_lifecycle_listener};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use prefetch::PrefetchScheduler;
