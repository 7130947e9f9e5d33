//! Thumbnail pipeline for the photogrid engine.
//!
//! This module provides:
//! - `TaskLimiter` - Bounded admission gate for decode work
//! - `ImageFetcher` / `FileImageFetcher` - Decoding from disk
//! - `CachingFetcher` - Memory LRU in front of any fetcher
//! - `ImageLoader` - Two-lane, priority-aware request dispatch

pub mod cache;
pub mod fetcher;
pub mod limiter;
pub mod loader;

pub use cache::{CacheKey, CachingFetcher};
pub use fetcher::{
    open_image, ContentMode, FetchDelivery, FileImageFetcher, ImageFetcher, TargetSize, Thumbnail,
};
pub use limiter::{Permit, TaskLimiter};
pub use loader::{ImageLoader, LoadCompletion, LoadRequest};
