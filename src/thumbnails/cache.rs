//! Memory cache in front of an image fetcher.
//!
//! - LRU of decoded thumbnails with a configurable byte budget
//! - Keys are an xxhash of (identifier + size + mode)
//! - Only the first final (non-degraded) image is cached; a hit skips the
//!   preview

use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};
use xxhash_rust::xxh3::xxh3_64;

use super::fetcher::{ContentMode, FetchDelivery, ImageFetcher, TargetSize, Thumbnail};
use crate::models::MediaHandle;

/// Minimum memory cache size in megabytes.
const MIN_MEMORY_MB: usize = 64;

/// Maximum memory cache size in megabytes.
const MAX_MEMORY_MB: usize = 512;

/// Bump when decode semantics change.
const CACHE_VERSION: u8 = 1;

/// Entry cap for the LRU, independent of the byte budget.
const DEFAULT_LRU_CAPACITY: usize = 4096;

/// Cache key for thumbnail lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    pub fn new(identifier: &str, target: TargetSize, mode: ContentMode) -> Self {
        let mut data = Vec::with_capacity(identifier.len() + 10);
        data.push(CACHE_VERSION);
        data.extend_from_slice(identifier.as_bytes());
        match target {
            TargetSize::Pixels { width, height } => {
                data.extend_from_slice(&width.to_le_bytes());
                data.extend_from_slice(&height.to_le_bytes());
            }
            TargetSize::Original => data.push(0xff),
        }
        data.push(match mode {
            ContentMode::AspectFill => 0,
            ContentMode::AspectFit => 1,
        });
        Self(xxh3_64(&data))
    }
}

struct CacheState {
    entries: LruCache<CacheKey, Thumbnail>,
    current_bytes: usize,
}

/// Fetcher wrapper that remembers final images.
pub struct CachingFetcher {
    inner: Arc<dyn ImageFetcher>,
    max_memory_bytes: usize,
    state: Mutex<CacheState>,
}

impl CachingFetcher {
    /// Wraps `inner` with a budget of `max_memory_mb`, clamped to 64..=512.
    pub fn new(inner: Arc<dyn ImageFetcher>, max_memory_mb: usize) -> Self {
        let max_memory_mb = max_memory_mb.clamp(MIN_MEMORY_MB, MAX_MEMORY_MB);
        debug!(max_memory_mb, "Initialized thumbnail cache");
        Self::with_budget_bytes(inner, max_memory_mb * 1024 * 1024)
    }

    fn with_budget_bytes(inner: Arc<dyn ImageFetcher>, max_memory_bytes: usize) -> Self {
        let capacity = NonZeroUsize::new(DEFAULT_LRU_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            max_memory_bytes,
            state: Mutex::new(CacheState {
                entries: LruCache::new(capacity),
                current_bytes: 0,
            }),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Thumbnail> {
        self.state.lock().entries.get(key).cloned()
    }

    fn insert(&self, key: CacheKey, thumbnail: Thumbnail) {
        let needed = thumbnail.memory_bytes();
        if needed > self.max_memory_bytes {
            trace!(needed, "Thumbnail larger than cache budget, not cached");
            return;
        }

        let mut state = self.state.lock();
        if let Some(old) = state.entries.pop(&key) {
            state.current_bytes = state.current_bytes.saturating_sub(old.memory_bytes());
        }

        while state.current_bytes + needed > self.max_memory_bytes {
            match state.entries.pop_lru() {
                Some((_, evicted)) => {
                    state.current_bytes = state.current_bytes.saturating_sub(evicted.memory_bytes());
                    trace!(
                        evicted_bytes = evicted.memory_bytes(),
                        current_bytes = state.current_bytes,
                        "Evicted thumbnail from memory cache"
                    );
                }
                None => break,
            }
        }

        if let Some((_, evicted)) = state.entries.push(key, thumbnail) {
            // Entry-count cap hit.
            state.current_bytes = state.current_bytes.saturating_sub(evicted.memory_bytes());
        }
        state.current_bytes += needed;
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.current_bytes = 0;
        debug!("Cleared memory cache");
    }

    /// Current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.state.lock().current_bytes
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn max_memory(&self) -> usize {
        self.max_memory_bytes
    }
}

impl ImageFetcher for CachingFetcher {
    fn fetch(
        &self,
        handle: &MediaHandle,
        target: TargetSize,
        mode: ContentMode,
        deliver: &mut dyn FnMut(FetchDelivery),
    ) -> Result<()> {
        let key = CacheKey::new(handle.identifier(), target, mode);

        if let Some(image) = self.get(&key) {
            trace!(identifier = handle.identifier(), "Memory cache hit");
            deliver(FetchDelivery {
                image,
                degraded: false,
            });
            return Ok(());
        }

        let mut first_final = None;
        self.inner.fetch(handle, target, mode, &mut |delivery| {
            if !delivery.degraded && first_final.is_none() {
                first_final = Some(delivery.image.clone());
            }
            deliver(delivery);
        })?;

        if let Some(image) = first_final {
            self.insert(key, image);
        }
        Ok(())
    }
}
