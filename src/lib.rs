//! Cinecache - a two-tier image cache for scrolling media catalogues.
//!
//! This crate keeps decoded images in a cost-bounded memory LRU, persists
//! downloaded bytes on disk, shares one download between concurrent
//! requests for the same URL, and warms the cache ahead of need.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Domain layer containing entities, errors, and port definitions.
pub mod domain;
/// Infrastructure layer containing cache tiers and adapters.
pub mod infrastructure;

/// Current version of the application.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name.
pub const NAME: &str = "cinecache";
