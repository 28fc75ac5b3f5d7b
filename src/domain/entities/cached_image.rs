//! Domain types for decoded, cached images.

use std::sync::Arc;

use super::CacheKey;

/// Bytes per pixel assumed for a decoded bitmap.
/// Decoded images are accounted as RGBA regardless of the source format.
pub const BYTES_PER_PIXEL: u64 = 4;

/// A decoded image together with its memory cost.
///
/// Immutable once constructed; shared between callers behind an [`Arc`].
#[derive(Debug)]
pub struct CachedImage {
    image: image::DynamicImage,
    cost: u64,
}

impl CachedImage {
    /// Wraps a decoded image, computing its cost from its dimensions.
    #[must_use]
    pub fn new(image: image::DynamicImage) -> Self {
        let cost = Self::cost_of(image.width(), image.height());
        Self { image, cost }
    }

    /// Decodes encoded image bytes (PNG, JPEG, WebP).
    ///
    /// # Errors
    /// Returns the decoder error if the bytes are not a supported image.
    pub fn decode(bytes: &[u8]) -> Result<Self, image::ImageError> {
        image::load_from_memory(bytes).map(Self::new)
    }

    /// Computes the memory cost of a bitmap with the given dimensions.
    #[must_use]
    pub const fn cost_of(width: u32, height: u32) -> u64 {
        width as u64 * height as u64 * BYTES_PER_PIXEL
    }

    /// Returns the decoded image.
    #[must_use]
    pub const fn image(&self) -> &image::DynamicImage {
        &self.image
    }

    /// Returns the memory cost used for eviction budgeting.
    #[must_use]
    pub const fn cost(&self) -> u64 {
        self.cost
    }

    /// Returns the image width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Returns the image height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from the in-memory cache.
    MemoryCache,
    /// Loaded from the disk cache.
    DiskCache,
    /// Downloaded through the transport.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A loaded image ready for display.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// The cache key.
    pub key: CacheKey,
    /// The decoded image.
    pub image: Arc<CachedImage>,
    /// Where the image was loaded from.
    pub source: ImageSource,
}
