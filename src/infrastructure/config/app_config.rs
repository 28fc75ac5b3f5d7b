//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::infrastructure::image::{ImageCacheConfig, default_cache_dir, memory_cache};
use crate::infrastructure::transport::HttpTransportConfig;

use super::args::CliArgs;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Converts a day count to a duration, saturating instead of overflowing.
#[must_use]
pub const fn retention_from_days(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(SECONDS_PER_DAY))
}

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

/// Application configuration, loaded from TOML and overridden by CLI flags.
#[derive(Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for disk cache files.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Memory cost budget, in decoded pixel bytes.
    #[serde(default = "default_max_total_cost")]
    pub max_total_cost: u64,

    /// Maximum number of images held in memory.
    #[serde(default = "default_max_entry_count")]
    pub max_entry_count: usize,

    /// Days after which unused disk entries are removed.
    #[serde(default = "default_disk_retention_days")]
    pub disk_retention_days: u64,
}

impl CacheConfig {
    /// Returns the configured cache directory or the platform default.
    #[must_use]
    pub fn effective_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_cache_dir)
    }

    /// Returns the disk retention window.
    #[must_use]
    pub const fn disk_retention(&self) -> Duration {
        retention_from_days(self.disk_retention_days)
    }

    /// Builds the library-facing cache configuration.
    #[must_use]
    pub const fn image_cache_config(&self) -> ImageCacheConfig {
        ImageCacheConfig {
            max_total_cost: self.max_total_cost,
            max_entry_count: self.max_entry_count,
            disk_retention: self.disk_retention(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: None,
            max_total_cost: default_max_total_cost(),
            max_entry_count: default_max_entry_count(),
            disk_retention_days: default_disk_retention_days(),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum concurrent downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// User agent override.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl NetworkConfig {
    /// Builds the HTTP transport configuration.
    #[must_use]
    pub fn http_transport_config(&self) -> HttpTransportConfig {
        let defaults = HttpTransportConfig::default();
        HttpTransportConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            max_concurrent_downloads: self.max_concurrent_downloads,
            user_agent: self.user_agent.clone().unwrap_or(defaults.user_agent),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            user_agent: None,
        }
    }
}

const fn default_max_total_cost() -> u64 {
    memory_cache::DEFAULT_MAX_TOTAL_COST
}

const fn default_max_entry_count() -> usize {
    memory_cache::DEFAULT_MAX_ENTRY_COUNT
}

const fn default_disk_retention_days() -> u64 {
    7
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_max_concurrent_downloads() -> usize {
    4
}

impl AppConfig {
    /// Merges CLI arguments into the configuration.
    pub fn merge_with_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(cache_dir) = &args.cache_dir {
            self.cache.directory = Some(cache_dir.clone());
        }
        if let Some(max_total_cost) = args.max_total_cost {
            self.cache.max_total_cost = max_total_cost;
        }
        if let Some(max_entry_count) = args.max_entry_count {
            self.cache.max_entry_count = max_entry_count;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.network.timeout_secs = timeout_secs;
        }
    }

    /// Replaces limits that would leave the cache unusable with their defaults.
    ///
    /// Returns the names of the keys that were reset.
    pub fn normalize(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();
        if self.cache.max_total_cost == 0 {
            self.cache.max_total_cost = default_max_total_cost();
            reset.push("cache.max_total_cost");
        }
        if self.cache.max_entry_count == 0 {
            self.cache.max_entry_count = default_max_entry_count();
            reset.push("cache.max_entry_count");
        }
        if self.network.timeout_secs == 0 {
            self.network.timeout_secs = default_timeout_secs();
            reset.push("network.timeout_secs");
        }
        if self.network.max_concurrent_downloads == 0 {
            self.network.max_concurrent_downloads = default_max_concurrent_downloads();
            reset.push("network.max_concurrent_downloads");
        }
        for key in &reset {
            warn!(key = *key, "Configured value must be positive, using default");
        }
        reset
    }

    /// Returns effective log path.
    #[must_use]
    pub fn effective_log_path(&self) -> Option<PathBuf> {
        self.log_path.clone()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            log_level: LogLevel::Info,
            cache: CacheConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            max_entry_count = 120
            disk_retention_days = 3

            [network]
            user_agent = "poster-browser/2.0"
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.max_entry_count, 120);
        assert_eq!(config.cache.max_total_cost, 30 * 1024 * 1024);
        assert_eq!(
            config.cache.disk_retention(),
            Duration::from_secs(3 * 24 * 60 * 60)
        );
        assert_eq!(config.network.timeout_secs, 30);
        assert_eq!(
            config.network.http_transport_config().user_agent,
            "poster-browser/2.0"
        );
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        let cache = config.cache.image_cache_config();

        assert_eq!(cache.max_total_cost, 30 * 1024 * 1024);
        assert_eq!(cache.max_entry_count, 50);
        assert_eq!(cache.disk_retention, Duration::from_secs(7 * 24 * 60 * 60));
        assert!(config.effective_log_path().is_none());
    }

    #[test]
    fn test_huge_retention_saturates() {
        let config: AppConfig =
            toml::from_str("[cache]\ndisk_retention_days = 300000000000000\n").unwrap();

        let cache = config.cache.image_cache_config();

        assert_eq!(cache.disk_retention, Duration::from_secs(u64::MAX));
        assert_eq!(retention_from_days(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_normalize_resets_zero_limits() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [cache]
            max_total_cost = 0
            max_entry_count = 10

            [network]
            max_concurrent_downloads = 0
            "#,
        )
        .unwrap();

        let reset = config.normalize();

        assert_eq!(
            reset,
            vec!["cache.max_total_cost", "network.max_concurrent_downloads"]
        );
        assert_eq!(config.cache.max_total_cost, 30 * 1024 * 1024);
        assert_eq!(config.cache.max_entry_count, 10);
        assert_eq!(config.network.max_concurrent_downloads, 4);
        assert!(config.normalize().is_empty());
    }

    #[test]
    fn test_cli_args_override_file_values() {
        let mut config: AppConfig = toml::from_str(
            r#"
            [cache]
            max_total_cost = 1000
            directory = "/var/cache/posters"
            "#,
        )
        .unwrap();
        let args = CliArgs::parse_from([
            "cinecache",
            "--max-total-cost",
            "5000",
            "--log-level",
            "warn",
            "clear",
        ]);

        config.merge_with_args(&args);

        assert_eq!(config.cache.max_total_cost, 5000);
        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(
            config.cache.effective_directory(),
            PathBuf::from("/var/cache/posters")
        );
    }
}
