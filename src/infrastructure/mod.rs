//! Infrastructure layer with external service adapters.

/// Application configuration.
pub mod config;
/// Image handling (caching, connections, decoding, loading).
pub mod image;

pub use self::config::{AppConfig, CliArgs, ConfigError, LogLevel, StorageManager};
pub use self::image::{
    CacheStats, DefaultImageInput, ImageEndpoint, ImageLoadedEvent, ImageLoader,
    ImageLoaderConfig, LoadTask, MemoryImageCache, RasterDecoder, TokioImageExecutor,
};
