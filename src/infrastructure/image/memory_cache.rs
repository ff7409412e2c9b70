//! In-memory LRU image cache bounded by decoded size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use lru::LruCache;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, CachedImage, ImageInformation};
use crate::domain::ports::ImageCachePort;

/// Default byte budget for decoded images.
pub const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Returns the decoded size of an image in bytes.
#[must_use]
pub fn image_size(image: &image::DynamicImage) -> usize {
    image.as_bytes().len()
}

struct Entry {
    image: Arc<image::DynamicImage>,
    info: ImageInformation,
    size: usize,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    total_bytes: usize,
}

impl Inner {
    fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.total_bytes -= entry.size;
                true
            }
            None => false,
        }
    }
}

/// In-memory LRU cache for decoded images.
///
/// Capacity is a byte budget rather than an entry count: adding an image
/// evicts least recently used entries until the sum of decoded sizes fits.
pub struct MemoryImageCache {
    inner: Arc<RwLock<Inner>>,
    max_bytes: usize,
    entry_count: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `max_bytes` of decoded pixels.
    #[must_use]
    pub fn new(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            })),
            max_bytes,
            entry_count: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the configured byte budget.
    #[must_use]
    pub const fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the decoded size currently held.
    pub async fn total_bytes(&self) -> usize {
        self.inner.read().await.total_bytes
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
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            size: self.len(),
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub async fn peek(&self, key: &CacheKey) -> Option<CachedImage> {
        let inner = self.inner.read().await;
        inner.entries.peek(key).map(|entry| CachedImage {
            image: entry.image.clone(),
            info: entry.info.clone(),
        })
    }

    /// Returns true if `key` is cached, without touching recency.
    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.inner.read().await.entries.contains(key)
    }

    fn sync_len(&self, inner: &Inner) {
        self.entry_count.store(inner.entries.len(), Ordering::Relaxed);
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_BYTES)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted to stay within budget.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.size, self.hit_rate, self.hits, self.misses, self.evictions
        )
    }
}

#[async_trait::async_trait]
impl ImageCachePort for MemoryImageCache {
    async fn get(&self, key: &CacheKey) -> Option<CachedImage> {
        let mut inner = self.inner.write().await;
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(CachedImage {
                image: entry.image.clone(),
                info: entry.info.clone(),
            })
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    async fn add(&self, key: CacheKey, image: Arc<image::DynamicImage>, info: ImageInformation) {
        let size = image_size(&image);
        let mut inner = self.inner.write().await;
        inner.remove(&key);

        if size > self.max_bytes {
            debug!(key = %key, size, max = self.max_bytes, "Image exceeds memory cache budget, not cached");
            self.sync_len(&inner);
            return;
        }

        while inner.total_bytes + size > self.max_bytes {
            let Some((evicted, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes -= entry.size;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(key = %evicted, size = entry.size, "Evicted image from memory cache");
        }

        debug!(key = %key, size, "Storing image in memory cache");
        inner.total_bytes += size;
        inner.entries.put(key, Entry { image, info, size });
        self.sync_len(&inner);
    }

    async fn invalidate(&self, key: &CacheKey) {
        let mut inner = self.inner.write().await;
        if inner.remove(key) {
            debug!(key = %key, "Invalidated image in memory cache");
        }
        self.sync_len(&inner);
    }

    fn len(&self) -> usize {
        self.entry_count.load(Ordering::Relaxed)
    }

    async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.total_bytes = 0;
        self.sync_len(&inner);
        debug!("Cleared memory image cache");
    }
}
