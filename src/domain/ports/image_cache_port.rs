//! Port definition for image caching.

use std::sync::Arc;

use crate::domain::entities::{Bitmap, ImageKey, MemoryPressure, PixelFormat};

/// Port for the process-wide bitmap cache.
/// Implementations must be thread-safe; each operation is atomic on its own.
pub trait ImageCachePort: Send + Sync {
    /// Returns the cached bitmap and marks it most recently used.
    fn get(&self, key: &ImageKey) -> Option<Arc<Bitmap>>;

    /// Stores a bitmap. Inline keys are never cached.
    fn put(&self, key: ImageKey, bitmap: Arc<Bitmap>);

    /// Takes a scratch buffer able to hold `width` x `height` pixels of
    /// `format`. Never a cache hit: the contents are garbage.
    fn acquire_reusable_buffer(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Option<Vec<u8>>;

    /// Offers a scratch buffer that is no longer needed.
    fn recycle(&self, buffer: Vec<u8>) {
        drop(buffer);
    }

    /// Drops every cached entry.
    fn evict_all(&self);

    /// Shrinks the resident size to half the capacity.
    fn evict_half(&self);

    /// Reacts to memory pressure reported by the embedding application.
    fn on_memory_pressure(&self, level: MemoryPressure) {
        match level {
            MemoryPressure::Normal => {}
            MemoryPressure::Moderate => self.evict_half(),
            MemoryPressure::Severe => self.evict_all(),
        }
    }

    /// Returns the resident size in bytes.
    fn size(&self) -> usize;

    /// Returns the capacity in bytes.
    fn capacity(&self) -> usize;

    /// Returns the number of cached bitmaps.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
