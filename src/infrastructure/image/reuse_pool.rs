//! Pool of pixel buffers kept for reuse by the decoder.
//!
//! Entries are candidates, not cache hits. A retired bitmap that a view still
//! displays stays in the pool but cannot be claimed until the view lets go.
//! The pool is bounded by entry count and entry age; expired entries are
//! pruned while scanning.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use crate::domain::entities::{Bitmap, PixelFormat};

/// Default number of buffers kept.
pub const DEFAULT_MAX_BUFFERS: usize = 8;

/// Default time a buffer may wait for reuse.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30);

enum Candidate {
    Retired(Arc<Bitmap>),
    Scratch(Vec<u8>),
}

impl Candidate {
    fn capacity(&self) -> usize {
        match self {
            Self::Retired(bitmap) => bitmap.allocation_byte_count(),
            Self::Scratch(buffer) => buffer.capacity(),
        }
    }

    /// Only the pool holds it.
    fn is_claimable(&self) -> bool {
        match self {
            Self::Retired(bitmap) => Arc::strong_count(bitmap) == 1,
            Self::Scratch(_) => true,
        }
    }

    fn into_buffer(self) -> Result<Vec<u8>, Self> {
        match self {
            Self::Retired(bitmap) => Arc::try_unwrap(bitmap)
                .map(Bitmap::into_buffer)
                .map_err(Self::Retired),
            Self::Scratch(buffer) => Ok(buffer),
        }
    }
}

struct PoolEntry {
    candidate: Candidate,
    retired_at: Instant,
}

/// Bounded free-list of reusable pixel buffers. Thread-safe.
pub struct ReusePool {
    entries: Mutex<VecDeque<PoolEntry>>,
    max_buffers: usize,
    max_age: Duration,
}

impl ReusePool {
    /// Creates a pool holding at most `max_buffers` entries for at most
    /// `max_age` each.
    #[must_use]
    pub fn new(max_buffers: usize, max_age: Duration) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(max_buffers)),
            max_buffers,
            max_age,
        }
    }

    /// Keeps an evicted bitmap as a reuse candidate.
    pub fn retire(&self, bitmap: Arc<Bitmap>) {
        self.push(Candidate::Retired(bitmap));
    }

    /// Keeps a scratch buffer that nobody needs anymore.
    pub fn recycle(&self, buffer: Vec<u8>) {
        if buffer.capacity() == 0 {
            return;
        }
        self.push(Candidate::Scratch(buffer));
    }

    fn push(&self, candidate: Candidate) {
        if self.max_buffers == 0 {
            return;
        }
        let mut entries = self.entries.lock();
        while entries.len() >= self.max_buffers {
            entries.pop_front();
        }
        entries.push_back(PoolEntry {
            candidate,
            retired_at: Instant::now(),
        });
    }

    /// Removes and returns the first claimable buffer able to hold
    /// `width` x `height` pixels of `format`.
    pub fn acquire(&self, width: u32, height: u32, format: PixelFormat) -> Option<Vec<u8>> {
        let required = format.bytes_for(width, height);
        let now = Instant::now();
        let mut entries = self.entries.lock();

        let mut index = 0;
        while index < entries.len() {
            let entry = &entries[index];
            if now.duration_since(entry.retired_at) > self.max_age {
                entries.remove(index);
                trace!("Pruned expired reusable buffer");
                continue;
            }

            let fits = entry.candidate.capacity() as u64 >= required;
            if fits
                && entry.candidate.is_claimable()
                && let Some(entry) = entries.remove(index)
            {
                match entry.candidate.into_buffer() {
                    Ok(buffer) => {
                        trace!(
                            width,
                            height,
                            capacity = buffer.capacity(),
                            "Reusing pixel buffer"
                        );
                        return Some(buffer);
                    }
                    Err(candidate) => entries.insert(
                        index,
                        PoolEntry {
                            candidate,
                            retired_at: entry.retired_at,
                        },
                    ),
                }
            }
            index += 1;
        }
        None
    }

    /// Drops every candidate.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Returns the number of candidates, claimable or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the pool holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ReusePool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFERS, DEFAULT_MAX_AGE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    fn bitmap(width: u32, height: u32) -> Arc<Bitmap> {
        Arc::new(Bitmap::new(RgbaImage::new(width, height)))
    }

    #[test]
    fn test_acquire_returns_large_enough_buffer() {
        let pool = ReusePool::default();
        pool.retire(bitmap(2, 2));
        pool.retire(bitmap(10, 10));

        let buffer = pool.acquire(5, 5, PixelFormat::Rgba8888).expect("a 10x10 buffer fits");
        assert!(buffer.capacity() >= 5 * 5 * 4);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_never_returns_undersized_buffer() {
        let pool = ReusePool::default();
        pool.recycle(vec![0u8; 15]);
        pool.retire(bitmap(1, 1));

        assert!(pool.acquire(2, 2, PixelFormat::Rgba8888).is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_first_match_is_claimed() {
        let pool = ReusePool::default();
        pool.recycle(Vec::with_capacity(100));
        pool.recycle(Vec::with_capacity(200));

        let buffer = pool.acquire(5, 5, PixelFormat::Alpha8).expect("buffer available");
        assert_eq!(buffer.capacity(), 100);
    }

    #[test]
    fn test_bytes_per_pixel_respected() {
        let pool = ReusePool::default();
        pool.recycle(Vec::with_capacity(50));

        assert!(pool.acquire(5, 5, PixelFormat::Rgba8888).is_none());
        assert!(pool.acquire(5, 5, PixelFormat::Rgb565).is_some());
    }

    #[test]
    fn test_shared_bitmap_is_not_claimed() {
        let pool = ReusePool::default();
        let displayed = bitmap(4, 4);
        pool.retire(Arc::clone(&displayed));

        assert!(pool.acquire(4, 4, PixelFormat::Rgba8888).is_none());

        drop(displayed);
        assert!(pool.acquire(4, 4, PixelFormat::Rgba8888).is_some());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_expired_entries_are_pruned() {
        let pool = ReusePool::new(4, Duration::ZERO);
        pool.recycle(vec![0u8; 64]);
        std::thread::sleep(Duration::from_millis(2));

        assert!(pool.acquire(1, 1, PixelFormat::Alpha8).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_bounded_by_max_buffers() {
        let pool = ReusePool::new(2, DEFAULT_MAX_AGE);
        pool.recycle(Vec::with_capacity(10));
        pool.recycle(Vec::with_capacity(20));
        pool.recycle(Vec::with_capacity(30));

        assert_eq!(pool.len(), 2);
        let buffer = pool.acquire(1, 1, PixelFormat::Alpha8).expect("buffer available");
        assert_eq!(buffer.capacity(), 20);
    }

    #[test]
    fn test_concurrent_acquire_is_safe() {
        let pool = Arc::new(ReusePool::new(64, DEFAULT_MAX_AGE));
        for _ in 0..64 {
            pool.recycle(vec![0u8; 16]);
        }

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                std::thread::spawn(move || {
                    let mut claimed = 0;
                    while pool.acquire(2, 2, PixelFormat::Rgba8888).is_some() {
                        claimed += 1;
                    }
                    claimed
                })
            })
            .collect();

        let total: usize = handles
            .into_iter()
            .map(|h| h.join().expect("worker panicked"))
            .sum();
        assert_eq!(total, 64);
    }
}
