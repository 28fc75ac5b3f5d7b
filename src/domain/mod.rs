//! Domain layer with cache entities, errors, and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{CacheKey, CachedImage, ImageSource, LoadedImage};
pub use errors::{CacheError, CacheResult, TransportError};
pub use ports::{DiskStorePort, TransportPort};
