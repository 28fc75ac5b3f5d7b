//! Domain entity definitions.

mod cache_key;
mod cached_image;

pub use cache_key::CacheKey;
pub use cached_image::{BYTES_PER_PIXEL, CachedImage, ImageSource, LoadedImage};
