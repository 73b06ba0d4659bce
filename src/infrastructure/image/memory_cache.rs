//! In-memory LRU bitmap cache weighted by pixel bytes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{Bitmap, ImageKey, PixelFormat};
use crate::domain::ports::ImageCachePort;

use super::reuse_pool::ReusePool;

/// Default capacity in bytes when no budget is known.
pub const DEFAULT_CACHE_SIZE: usize = 32 * 1024 * 1024;

struct Entries {
    lru: LruCache<ImageKey, Arc<Bitmap>>,
    size: usize,
}

impl Entries {
    /// Evicts least recently used entries until `size <= max_size`.
    fn trim_to(&mut self, max_size: usize) -> Vec<Arc<Bitmap>> {
        let mut evicted = Vec::new();
        while self.size > max_size {
            let Some((key, bitmap)) = self.lru.pop_lru() else {
                break;
            };
            self.size = self.size.saturating_sub(bitmap.byte_count());
            trace!(key = %key, bytes = bitmap.byte_count(), "Evicted bitmap");
            evicted.push(bitmap);
        }
        evicted
    }
}

/// Size-bounded LRU cache for decoded bitmaps.
/// Thread-safe; every operation takes the lock once.
pub struct MemoryImageCache {
    entries: Mutex<Entries>,
    reuse_pool: ReusePool,
    max_size: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a cache holding at most `max_size` bytes of pixels.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self::with_reuse_pool(max_size, ReusePool::default())
    }

    /// Creates a cache with a custom reuse pool.
    #[must_use]
    pub fn with_reuse_pool(max_size: usize, reuse_pool: ReusePool) -> Self {
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::unbounded(),
                size: 0,
            }),
            reuse_pool,
            max_size,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a cache with a bounded reuse pool.
    #[must_use]
    pub fn with_pool_limits(max_size: usize, max_buffers: usize, max_age: Duration) -> Self {
        Self::with_reuse_pool(max_size, ReusePool::new(max_buffers, max_age))
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
        let (entries, size) = {
            let entries = self.entries.lock();
            (entries.lru.len(), entries.size)
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries,
            size,
            capacity: self.max_size,
            reusable: self.reuse_pool.len(),
        }
    }

    /// Peeks at a bitmap without promoting it in the LRU.
    #[must_use]
    pub fn peek(&self, key: &ImageKey) -> Option<Arc<Bitmap>> {
        self.entries.lock().lru.peek(key).cloned()
    }

    /// Returns true if the key is resident, without promoting it.
    #[must_use]
    pub fn contains(&self, key: &ImageKey) -> bool {
        self.entries.lock().lru.contains(key)
    }

    /// Returns the resident keys from most to least recently used.
    #[must_use]
    pub fn keys(&self) -> Vec<ImageKey> {
        self.entries.lock().lru.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Returns the reuse pool.
    #[must_use]
    pub const fn reuse_pool(&self) -> &ReusePool {
        &self.reuse_pool
    }

    fn trim_to(&self, max_size: usize) {
        let evicted = self.entries.lock().trim_to(max_size);
        if !evicted.is_empty() {
            debug!(count = evicted.len(), max_size, "Trimmed image cache");
        }
        for bitmap in evicted {
            self.reuse_pool.retire(bitmap);
        }
    }
}

impl Default for MemoryImageCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_SIZE)
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached bitmaps.
    pub entries: usize,
    /// Resident bytes.
    pub size: usize,
    /// Capacity in bytes.
    pub capacity: usize,
    /// Buffers waiting in the reuse pool.
    pub reusable: usize,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} KiB, {:.1}% hit rate ({} hits, {} misses), {} reusable buffers",
            self.entries,
            self.size / 1024,
            self.capacity / 1024,
            self.hit_rate,
            self.hits,
            self.misses,
            self.reusable
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &ImageKey) -> Option<Arc<Bitmap>> {
        let mut entries = self.entries.lock();
        if let Some(bitmap) = entries.lru.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(Arc::clone(bitmap))
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: ImageKey, bitmap: Arc<Bitmap>) {
        if key.is_inline() {
            trace!(key = %key, "Not caching inline image");
            return;
        }

        let size = bitmap.byte_count();
        let (replaced, evicted) = {
            let mut entries = self.entries.lock();
            entries.size += size;
            let replaced = entries.lru.put(key.clone(), bitmap);
            if let Some(old) = &replaced {
                entries.size = entries.size.saturating_sub(old.byte_count());
            }
            (replaced, entries.trim_to(self.max_size))
        };
        debug!(key = %key, bytes = size, "Stored bitmap in memory cache");

        for bitmap in replaced.into_iter().chain(evicted) {
            self.reuse_pool.retire(bitmap);
        }
    }

    fn acquire_reusable_buffer(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Option<Vec<u8>> {
        self.reuse_pool.acquire(width, height, format)
    }

    fn recycle(&self, buffer: Vec<u8>) {
        self.reuse_pool.recycle(buffer);
    }

    fn evict_all(&self) {
        let dropped = {
            let mut entries = self.entries.lock();
            let count = entries.lru.len();
            entries.lru.clear();
            entries.size = 0;
            count
        };
        self.reuse_pool.clear();
        debug!(count = dropped, "Evicted all bitmaps from memory cache");
    }

    fn evict_half(&self) {
        self.trim_to(self.max_size / 2);
    }

    fn size(&self) -> usize {
        self.entries.lock().size
    }

    fn capacity(&self) -> usize {
        self.max_size
    }

    fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::MemoryPressure;
    use image::RgbaImage;

    /// 1x1 RGBA bitmaps weigh 4 bytes, so `pixels` units of 4 bytes.
    fn bitmap(pixels: u32) -> Arc<Bitmap> {
        Arc::new(Bitmap::new(RgbaImage::new(pixels, 1)))
    }

    fn key(name: &str) -> ImageKey {
        ImageKey::new(name)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(1024);
        cache.put(key("test1"), bitmap(10));

        let retrieved = cache.get(&key("test1"));
        assert_eq!(retrieved.map(|b| b.width()), Some(10));
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(1024);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_lru_eviction_by_size() {
        let cache = MemoryImageCache::new(10);

        cache.put(key("A"), bitmap(1));
        cache.put(key("B"), bitmap(1));
        assert_eq!(cache.size(), 8);

        cache.put(key("C"), bitmap(1));

        assert_eq!(cache.size(), 8);
        assert!(!cache.contains(&key("A")));
        assert!(cache.contains(&key("B")));
        assert!(cache.contains(&key("C")));
    }

    #[test]
    fn test_get_promotes_entry() {
        let cache = MemoryImageCache::new(10);
        cache.put(key("A"), bitmap(1));
        cache.put(key("B"), bitmap(1));

        let _ = cache.get(&key("A"));
        cache.put(key("C"), bitmap(1));

        assert!(cache.contains(&key("A")));
        assert!(!cache.contains(&key("B")));
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(10);
        cache.put(key("A"), bitmap(1));
        cache.put(key("B"), bitmap(1));

        let _ = cache.peek(&key("A"));
        cache.put(key("C"), bitmap(1));

        assert!(cache.peek(&key("A")).is_none());
    }

    #[test]
    fn test_size_never_exceeds_capacity() {
        let cache = MemoryImageCache::new(100);
        for i in 0..200u32 {
            cache.put(key(&format!("k{}", i % 17)), bitmap(1 + i % 9));
            assert!(cache.size() <= cache.capacity(), "after put #{i}");
        }
    }

    #[test]
    fn test_oversized_entry_is_not_retained() {
        let cache = MemoryImageCache::new(10);
        cache.put(key("huge"), bitmap(5));

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_replacing_entry_updates_size() {
        let cache = MemoryImageCache::new(100);
        cache.put(key("A"), bitmap(4));
        cache.put(key("A"), bitmap(2));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.size(), 8);
        assert_eq!(cache.reuse_pool().len(), 1);
    }

    #[test]
    fn test_inline_keys_are_not_cached() {
        let cache = MemoryImageCache::new(100);
        cache.put(key("data:image/png;base64,AAAA"), bitmap(1));

        assert_eq!(cache.size(), 0);
        assert!(cache.get(&key("data:image/png;base64,AAAA")).is_none());
    }

    #[test]
    fn test_evicted_entry_is_a_buffer_not_a_hit() {
        let cache = MemoryImageCache::new(8);
        cache.put(key("A"), bitmap(2));
        cache.put(key("B"), bitmap(2));

        assert!(cache.get(&key("A")).is_none());
        let buffer = cache.acquire_reusable_buffer(2, 1, PixelFormat::Rgba8888);
        assert!(buffer.is_some_and(|b| b.capacity() >= 8));
        assert!(cache.get(&key("A")).is_none());
    }

    #[test]
    fn test_evict_half() {
        let cache = MemoryImageCache::new(40);
        for name in ["A", "B", "C", "D", "E"] {
            cache.put(key(name), bitmap(2));
        }
        assert_eq!(cache.size(), 40);

        cache.evict_half();

        assert!(cache.size() <= 20);
        assert_eq!(cache.keys(), vec![key("E"), key("D")]);
    }

    #[test]
    fn test_evict_all_drops_entries_and_pool() {
        let cache = MemoryImageCache::new(8);
        cache.put(key("A"), bitmap(2));
        cache.put(key("B"), bitmap(2));

        cache.evict_all();

        assert!(cache.is_empty());
        assert_eq!(cache.size(), 0);
        assert!(cache.reuse_pool().is_empty());
    }

    #[test]
    fn test_memory_pressure() {
        let cache = MemoryImageCache::new(16);
        cache.put(key("A"), bitmap(2));
        cache.put(key("B"), bitmap(2));

        cache.on_memory_pressure(MemoryPressure::Normal);
        assert_eq!(cache.len(), 2);

        cache.on_memory_pressure(MemoryPressure::Moderate);
        assert_eq!(cache.keys(), vec![key("B")]);

        cache.on_memory_pressure(MemoryPressure::Severe);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(1024);
        cache.put(key("test1"), bitmap(2));

        let _ = cache.get(&key("test1"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.size, 8);
        assert!(stats.to_string().contains("50.0% hit rate"));
    }
}
