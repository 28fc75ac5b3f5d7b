//! Locating, loading and saving `config.toml`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::app_config::AppConfig;
use super::args::CliArgs;

const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors raised while locating or persisting the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No platform configuration directory.
    #[error("failed to determine config directory")]
    ConfigDirNotFound,
    /// Filesystem failure.
    #[error("io error at {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Could not serialize the configuration.
    #[error("toml serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The TOML file backing [`AppConfig`].
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    /// Uses `path_override` if given, otherwise `config.toml` in the platform
    /// configuration directory.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ConfigDirNotFound` if no override is given and the
    /// platform has no configuration directory.
    pub fn locate(path_override: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path_override {
            return Ok(Self::at(path));
        }
        ProjectDirs::from("com", "linuxmobile", crate::NAME)
            .map(|dirs| Self::at(dirs.config_dir().join(CONFIG_FILE_NAME)))
            .ok_or(ConfigError::ConfigDirNotFound)
    }

    /// Uses the file at `path`.
    #[must_use]
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file, writing the defaults first if it does not exist.
    ///
    /// A malformed file is left untouched and defaults are used. Limits that
    /// would disable the cache are reset to their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or the defaults cannot be written.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
                warn!(path = %self.path.display(), error = %e, "Malformed config file, using defaults");
                AppConfig::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Config file not found, writing defaults");
                let config = AppConfig::default();
                self.save(&config)?;
                config
            }
            Err(e) => return Err(ConfigError::io(&self.path, e)),
        };
        config.normalize();
        Ok(config)
    }

    /// Loads the file and applies command-line overrides on top.
    ///
    /// # Errors
    ///
    /// See [`ConfigFile::load`].
    pub fn load_with_args(&self, args: &CliArgs) -> Result<AppConfig, ConfigError> {
        let mut config = self.load()?;
        config.merge_with_args(args);
        config.normalize();
        debug!(
            cache_dir = %config.cache.effective_directory().display(),
            max_total_cost = config.cache.max_total_cost,
            max_entry_count = config.cache.max_entry_count,
            "Configuration resolved"
        );
        Ok(config)
    }

    /// Writes `config` atomically, creating the parent directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be written.
    pub fn save(&self, config: &AppConfig) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(config)?;
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;

        let mut temp_file =
            tempfile::NamedTempFile::new_in(parent).map_err(|e| ConfigError::io(parent, e))?;
        temp_file
            .write_all(content.as_bytes())
            .map_err(|e| ConfigError::io(temp_file.path(), e))?;
        temp_file
            .persist(&self.path)
            .map_err(|e| ConfigError::io(&self.path, e.error))?;
        Ok(())
    }
}
