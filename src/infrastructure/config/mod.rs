//! Application configuration.

/// Configuration values and defaults.
pub mod app_config;
/// Command-line arguments.
pub mod args;
/// The configuration file on disk.
pub mod config_file;

pub use app_config::{AppConfig, CacheConfig, LogLevel, NetworkConfig, retention_from_days};
pub use args::{CliArgs, Command};
pub use config_file::{ConfigError, ConfigFile};
