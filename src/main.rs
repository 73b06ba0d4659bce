use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use tokio::sync::mpsc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imageview::domain::ports::ImageCachePort;
use imageview::infrastructure::{AppConfig, CliArgs, ImageLoader, StorageManager};
use imageview::presentation::{ImageView, ImageViewHost, ImageViewOptions, LoadOutcome};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = config.effective_log_path() {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry().with(filter).init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let storage = StorageManager::new()?;
    let mut config = storage.load_config(args.config.as_deref())?;
    config.merge_with_args(args);
    Ok(config)
}

struct Entry {
    key: String,
    view: ImageView,
    failure: Rc<RefCell<Option<String>>>,
}

fn open_view(host: &ImageViewHost, args: &CliArgs, key: &str) -> Entry {
    let view = host.create_view();
    let failure = Rc::new(RefCell::new(None));
    let slot = Rc::clone(&failure);
    view.set_listener(move |_, outcome| {
        if let LoadOutcome::Failed(error) = outcome {
            *slot.borrow_mut() = Some(error.to_string());
        }
        false
    });

    view.on_attached();
    view.on_size_changed(args.width, args.height);
    view.load(key);

    Entry {
        key: key.to_string(),
        view,
        failure,
    }
}

fn report(entries: &[Entry]) {
    for entry in entries {
        let size = entry
            .view
            .bitmap()
            .map(|bitmap| format!("{}x{}", bitmap.width(), bitmap.height()))
            .unwrap_or_default();
        let detail = entry.failure.borrow().clone().unwrap_or_default();
        println!(
            "{:<8} {:<8} {:<10} {} {}",
            entry.view.id(),
            entry.view.state(),
            size,
            entry.key,
            detail
        );
    }
}

fn save_bitmaps(dir: &Path, entries: &[Entry]) -> Result<()> {
    std::fs::create_dir_all(dir)
        .wrap_err_with(|| format!("Failed to create {}", dir.display()))?;

    for entry in entries {
        let (Some(bitmap), Some(key)) = (entry.view.bitmap(), entry.view.displayed_key()) else {
            continue;
        };
        let path = dir.join(format!("{}.png", key.short_id()));
        bitmap
            .pixels()
            .save_with_format(&path, image::ImageFormat::Png)
            .wrap_err_with(|| format!("Failed to write {}", path.display()))?;
        info!(key = %key, path = %path.display(), "Saved bitmap");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = imageview::VERSION, "Starting {}", imageview::NAME);
    if let Some(path) = config.effective_config_path() {
        debug!(path = %path.display(), "Configuration source");
    }

    let cache = config.cache.build().map(Arc::new);
    let (tx, rx) = mpsc::unbounded_channel();
    let mut loader = ImageLoader::new(&config.loader, tx)?;
    if let Some(endpoint) = config.endpoint.clone() {
        loader = loader.with_endpoint(endpoint);
    }

    let shared_cache = cache
        .clone()
        .map(|cache| cache as Arc<dyn ImageCachePort>);
    let mut host = ImageViewHost::new(loader, rx, shared_cache);
    host.set_default_options(ImageViewOptions::from(&config.view));

    let entries: Vec<Entry> = args
        .keys
        .iter()
        .map(|key| open_view(&host, &args, key))
        .collect();

    host.run_until_idle().await;

    report(&entries);
    if let Some(cache) = &cache {
        println!("{}", cache.stats());
    }
    if let Some(dir) = &args.save {
        save_bitmaps(dir, &entries)?;
    }

    Ok(())
}
