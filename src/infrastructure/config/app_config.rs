//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ports::StaticMemoryBudget;
use crate::infrastructure::image::reuse_pool::{DEFAULT_MAX_AGE, DEFAULT_MAX_BUFFERS};
use crate::infrastructure::image::{
    ImageEndpoint, ImageLoaderConfig, MemoryImageCache, cache_size_from,
};

use super::args::CliArgs;

const APP_NAME: &str = "imageview";
const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "linuxmobile";

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    #[default]
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration, read from `config.toml` and overridden by CLI
/// flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration file path.
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[serde(skip)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Bitmap cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Loader configuration.
    #[serde(default)]
    pub loader: ImageLoaderConfig,

    /// Default view options.
    #[serde(default)]
    pub view: ViewConfig,

    /// Backend image endpoint for numeric keys.
    #[serde(default)]
    pub endpoint: Option<ImageEndpoint>,
}

/// Bitmap cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Use a shared memory cache at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Memory class of the process in MiB; sizes the cache.
    #[serde(default = "default_memory_class_mb")]
    pub memory_class_mb: u32,

    /// Explicit cache size in bytes. Wins over the memory class.
    #[serde(default)]
    pub max_size_bytes: Option<usize>,

    /// Buffers kept for reuse after eviction.
    #[serde(default = "default_reuse_pool_buffers")]
    pub reuse_pool_buffers: usize,

    /// Seconds a reusable buffer is kept.
    #[serde(default = "default_reuse_pool_max_age_secs")]
    pub reuse_pool_max_age_secs: u64,
}

impl CacheConfig {
    /// Cache capacity in bytes.
    #[must_use]
    pub fn effective_size(&self) -> usize {
        self.max_size_bytes
            .unwrap_or_else(|| cache_size_from(&StaticMemoryBudget(self.memory_class_mb)))
    }

    /// Builds the configured cache, or `None` when disabled.
    #[must_use]
    pub fn build(&self) -> Option<MemoryImageCache> {
        self.enabled.then(|| {
            MemoryImageCache::with_pool_limits(
                self.effective_size(),
                self.reuse_pool_buffers,
                Duration::from_secs(self.reuse_pool_max_age_secs),
            )
        })
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_class_mb: default_memory_class_mb(),
            max_size_bytes: None,
            reuse_pool_buffers: default_reuse_pool_buffers(),
            reuse_pool_max_age_secs: default_reuse_pool_max_age_secs(),
        }
    }
}

/// Default options for new views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Cross-fade newly loaded images.
    #[serde(default = "default_true")]
    pub fading: bool,

    /// Look images up in, and store them into, the shared cache.
    #[serde(default = "default_true")]
    pub use_memory_cache: bool,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            fading: true,
            use_memory_cache: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_memory_class_mb() -> u32 {
    64
}

fn default_reuse_pool_buffers() -> usize {
    DEFAULT_MAX_BUFFERS
}

fn default_reuse_pool_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(config_path) = &args.config {
            self.config = Some(config_path.clone());
        }
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(memory_class) = args.memory_class {
            self.cache.memory_class_mb = memory_class;
        }
        if let Some(cache_size) = args.cache_size {
            self.cache.max_size_bytes = Some(cache_size);
        }
        if args.no_cache {
            self.cache.enabled = false;
        }
        if let Some(workers) = args.workers {
            self.loader.workers = workers;
        }
        if let Some(retries) = args.out_of_memory_retries {
            self.loader.out_of_memory_retries = retries;
        }
        if let Some(fading) = args.fading {
            self.view.fading = fading;
        }
        if let Some(base_url) = &args.base_url {
            let endpoint = self
                .endpoint
                .get_or_insert_with(|| ImageEndpoint::new(base_url.clone()));
            endpoint.base_url.clone_from(base_url);
        }
        if let Some(username) = &args.username
            && let Some(endpoint) = self.endpoint.as_mut()
        {
            endpoint.username = Some(username.clone());
        }
        if let Some(password) = &args.password
            && let Some(endpoint) = self.endpoint.as_mut()
        {
            endpoint.password = Some(password.clone());
        }
    }

    /// Returns default config directory.
    #[must_use]
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Returns default config file path.
    #[must_use]
    pub fn default_config_path() -> Option<PathBuf> {
        Self::default_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Returns default log file path.
    #[must_use]
    pub fn default_log_path() -> Option<PathBuf> {
        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("imageview.log"))
    }

    /// Returns effective config path.
    #[must_use]
    pub fn effective_config_path(&self) -> Option<PathBuf> {
        self.config.clone().or_else(Self::default_config_path)
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone().or_else(Self::default_log_path)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config: None,
            log_path: None,
            log_level: LogLevel::Info,
            cache: CacheConfig::default(),
            loader: ImageLoaderConfig::default(),
            view: ViewConfig::default(),
            endpoint: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_config_sections() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            memory_class_mb = 24
            reuse_pool_buffers = 2

            [loader]
            workers = 8
            out_of_memory_retries = 2

            [view]
            fading = false

            [endpoint]
            base_url = "https://node.local/api/v1/images"
            username = "user"
            password = "secret"
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.memory_class_mb, 24);
        assert_eq!(config.cache.reuse_pool_buffers, 2);
        assert!(config.cache.enabled);
        assert_eq!(config.loader.workers, 8);
        assert_eq!(config.loader.out_of_memory_retries, 2);
        assert_eq!(config.loader.timeout_secs, 30);
        assert!(!config.view.fading);
        assert!(config.view.use_memory_cache);

        let endpoint = config.endpoint.expect("endpoint section");
        assert_eq!(endpoint.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert!(config.cache.enabled);
        assert_eq!(config.cache.memory_class_mb, 64);
        assert_eq!(config.loader.out_of_memory_retries, 1);
        assert_eq!(config.loader.workers, 4);
        assert!(config.view.fading);
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_cache_size_from_memory_class() {
        let cache = CacheConfig {
            memory_class_mb: 32,
            ..CacheConfig::default()
        };
        assert_eq!(cache.effective_size(), 8 * 1024 * 1024);
    }

    #[test]
    fn test_explicit_cache_size_wins() {
        let cache = CacheConfig {
            memory_class_mb: 32,
            max_size_bytes: Some(1234),
            ..CacheConfig::default()
        };
        assert_eq!(cache.effective_size(), 1234);
    }

    #[test]
    fn test_disabled_cache_builds_nothing() {
        let cache = CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        };
        assert!(cache.build().is_none());
    }

    #[test]
    fn test_merge_with_args() {
        let args = CliArgs::parse_from([
            "imageview",
            "--width",
            "320",
            "--height",
            "240",
            "--log-level",
            "warn",
            "--workers",
            "2",
            "--memory-class",
            "16",
            "--fading",
            "false",
            "--base-url",
            "https://node.local/images",
            "--username",
            "user",
            "42",
        ]);

        let mut config = AppConfig::default();
        config.merge_with_args(&args);

        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.loader.workers, 2);
        assert_eq!(config.cache.memory_class_mb, 16);
        assert!(!config.view.fading);
        let endpoint = config.endpoint.expect("endpoint from flags");
        assert_eq!(endpoint.base_url, "https://node.local/images");
        assert_eq!(endpoint.username.as_deref(), Some("user"));
    }

    #[test]
    fn test_no_cache_flag_disables_cache() {
        let args = CliArgs::parse_from(["imageview", "--no-cache", "a.png"]);
        let mut config = AppConfig::default();
        config.merge_with_args(&args);
        assert!(!config.cache.enabled);
    }
}
