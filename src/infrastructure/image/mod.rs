//! Image handling infrastructure.
//!
//! This module provides:
//! - Memory caching with LRU eviction and a buffer reuse pool
//! - Connections for HTTP, backend endpoints and inline data
//! - Decoding and fit-to-box scaling
//! - Async image loading pipeline

pub mod capacity;
pub mod connection;
pub mod decoder;
pub mod executor;
pub mod loader;
pub mod memory_cache;
pub mod reuse_pool;

pub use capacity::{cache_size_for_memory_class, cache_size_from};
pub use connection::{DefaultImageInput, HttpConnection, ImageEndpoint, InlineDataConnection};
pub use decoder::{RasterDecoder, decode_scaled, fit_within, scale_to_fit};
pub use executor::{TokioImageExecutor, run_blocking};
pub use loader::{ImageLoadedEvent, ImageLoader, ImageLoaderConfig, LoadTask};
pub use memory_cache::{CacheStats, MemoryImageCache};
pub use reuse_pool::ReusePool;
