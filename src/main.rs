use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use futures_util::future::join_all;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use cinecache::domain::entities::{CacheKey, LoadedImage};
use cinecache::domain::ports::{DiskStorePort, TransportPort};
use cinecache::infrastructure::{
    AppConfig, CliArgs, Command, ConfigFile, DiskImageCache, HttpTransport, ImageCache,
    PrefetchScheduler,
};
use cinecache::infrastructure::config::retention_from_days;

const PREFETCH_POLL_INTERVAL: Duration = Duration::from_millis(50);

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
        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let file = ConfigFile::locate(args.config.as_deref())?;
    Ok(file.load_with_args(args)?)
}

#[derive(Debug, Serialize)]
struct FetchReport<'a> {
    url: &'a str,
    source: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    cost: Option<u64>,
    error: Option<String>,
}

impl<'a> FetchReport<'a> {
    fn new(url: &'a str, result: &cinecache::domain::CacheResult<LoadedImage>) -> Self {
        match result {
            Ok(loaded) => Self {
                url,
                source: Some(loaded.source.to_string()),
                width: Some(loaded.image.width()),
                height: Some(loaded.image.height()),
                cost: Some(loaded.image.cost()),
                error: None,
            },
            Err(e) => Self {
                url,
                source: None,
                width: None,
                height: None,
                cost: None,
                error: Some(e.to_string()),
            },
        }
    }
}

async fn run_fetch(cache: &ImageCache, urls: &[String], json: bool) -> Result<()> {
    let results = join_all(urls.iter().map(|url| cache.load(url))).await;

    for (url, result) in urls.iter().zip(&results) {
        let report = FetchReport::new(url, result);
        if json {
            println!("{}", serde_json::to_string(&report)?);
        } else if let Some(error) = &report.error {
            println!("{url}: error: {error}");
        } else {
            println!(
                "{url}: {}x{} from {} ({} bytes)",
                report.width.unwrap_or_default(),
                report.height.unwrap_or_default(),
                report.source.as_deref().unwrap_or_default(),
                report.cost.unwrap_or_default(),
            );
        }
    }

    if !json {
        println!("{}", cache.memory_stats());
    }
    Ok(())
}

async fn run_prefetch(cache: &ImageCache, urls: &[String]) {
    let scheduler = PrefetchScheduler::new(cache.clone());
    scheduler.update_visible_window(urls.iter().map(|url| CacheKey::from_url(url)));

    while scheduler.active_count() > 0 {
        tokio::time::sleep(PREFETCH_POLL_INTERVAL).await;
    }

    let stats = cache.memory_stats();
    println!("Prefetched {} of {} images", stats.size, urls.len());
}

async fn run_purge(cache: &ImageCache, disk: &DiskImageCache, older_than_days: Option<u64>) {
    let removed = match older_than_days {
        Some(days) => disk.remove_expired(retention_from_days(days)).await,
        None => cache.on_enter_background().await.unwrap_or_else(|e| {
            warn!(error = %e, "Purge task failed");
            0
        }),
    };
    println!("Removed {removed} expired entries");
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(version = cinecache::VERSION, "Starting {}", cinecache::NAME);

    let disk = Arc::new(DiskImageCache::new(config.cache.effective_directory()).await?);
    let transport = Arc::new(HttpTransport::new(
        &config.network.http_transport_config(),
    )?);
    let cache = ImageCache::new(
        config.cache.image_cache_config(),
        Arc::clone(&disk) as Arc<dyn DiskStorePort>,
        transport as Arc<dyn TransportPort>,
    );

    match &args.command {
        Command::Fetch { urls, json } => run_fetch(&cache, urls, *json).await?,
        Command::Prefetch { urls } => run_prefetch(&cache, urls).await,
        Command::Purge { older_than_days } => run_purge(&cache, &disk, *older_than_days).await,
        Command::Clear => {
            cache.clear_all().await;
            println!("Cache cleared");
        }
    }

    cache.flush_disk_writes().await;
    Ok(())
}
