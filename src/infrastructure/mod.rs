//! Infrastructure layer with cache tiers and external service adapters.

/// Application configuration.
pub mod config;
/// Image caching (memory, disk, shared fetches, prefetching).
pub mod image;
/// Network transports.
pub mod transport;

pub use self::config::{AppConfig, CacheConfig, CliArgs, Command, ConfigFile, LogLevel};
pub use self::image::{
    CacheStats, DiskImageCache, FetchCoordinator, ImageCache, ImageCacheConfig, ImageHandle,
    LifecycleEvent, MemoryImageCache, PrefetchScheduler, spawn_lifecycle_listener,
};
pub use self::transport::{HttpTransport, HttpTransportConfig};
