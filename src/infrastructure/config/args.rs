use super::app_config::LogLevel;
use clap::Parser;
use std::path::PathBuf;

/// Command line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "imageview",
    version,
    about = "Load images into fixed-size views through a shared bitmap cache",
    long_about = None
)]
pub struct CliArgs {
    /// Image keys: URLs, numeric resource ids or `data:` URIs.
    #[arg(required = true, value_name = "KEY")]
    pub keys: Vec<String>,

    /// View width in pixels.
    #[arg(long, default_value_t = 256)]
    pub width: u32,

    /// View height in pixels.
    #[arg(long, default_value_t = 256)]
    pub height: u32,

    /// Write every loaded bitmap as PNG into this directory.
    #[arg(long, value_name = "DIR")]
    pub save: Option<PathBuf>,

    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Process memory class in MiB, used to size the cache.
    #[arg(long, value_name = "MIB")]
    pub memory_class: Option<u32>,

    /// Cache size in bytes, overriding the memory class.
    #[arg(long, value_name = "BYTES")]
    pub cache_size: Option<usize>,

    /// Disable the shared memory cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Maximum concurrent loads.
    #[arg(long)]
    pub workers: Option<usize>,

    /// Decode retries after running out of memory.
    #[arg(long)]
    pub out_of_memory_retries: Option<u32>,

    /// Cross-fade loaded images.
    #[arg(long)]
    pub fading: Option<bool>,

    /// Base URL of the backend image endpoint for numeric keys.
    #[arg(long, env = "IMAGEVIEW_BASE_URL")]
    pub base_url: Option<String>,

    /// Endpoint basic auth user.
    #[arg(long, env = "IMAGEVIEW_USERNAME")]
    pub username: Option<String>,

    /// Endpoint basic auth password.
    #[arg(long, env = "IMAGEVIEW_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}
