use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "cinecache",
    version,
    about = "Fetch, prefetch and maintain a two-tier image cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk cache directory.
    #[arg(long, value_name = "PATH", env = "CINECACHE_DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Memory cost budget in decoded pixel bytes.
    #[arg(long)]
    pub max_total_cost: Option<u64>,

    /// Maximum images kept in memory.
    #[arg(long)]
    pub max_entry_count: Option<usize>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Command to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Cache operations exposed on the command line.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Load images through the cache and report where each came from.
    Fetch {
        /// Image URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print one JSON object per image.
        #[arg(long)]
        json: bool,
    },
    /// Warm the cache for the given URLs.
    Prefetch {
        /// Image URLs, in display order.
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Remove disk entries not used recently.
    Purge {
        /// Retention window in days (defaults to the configured value).
        #[arg(long)]
        older_than_days: Option<u64>,
    },
    /// Remove every cached image.
    Clear,
}
