//! INI configuration file.
//!
//! Settings live in `<config dir>/hdrview/config.ini`. A missing file is not
//! an error: every setting has a default.
//!
//! ```ini
//! [executor]
//! worker_threads = 0        ; 0 = one per core
//! thread_name = hdrview-worker
//!
//! [loader]
//! selector_mode = fuzzy     ; fuzzy | regex
//!
//! [logging]
//! level = info              ; EnvFilter directive, RUST_LOG overrides
//! directory = /var/log/hdrview
//! file_name = hdrview.log
//! ```

use crate::executor::{PoolConfig, DEFAULT_THREAD_NAME};
use crate::image::SelectorMode;
use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "hdrview.log";

/// Default log level directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Errors raised while reading or writing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(section: &str, key: &str, value: &str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            section: section.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Path of the configuration file in the user's config directory.
///
/// Falls back to the working directory when no config directory is known.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hdrview")
        .join("config.ini")
}

// =============================================================================
// Sections
// =============================================================================

/// `[executor]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Worker thread count. Zero selects the available parallelism.
    pub worker_threads: usize,
    /// Worker thread name prefix.
    pub thread_name: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}

impl ExecutorConfig {
    pub fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Pool configuration for these settings.
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::new(self.worker_threads).with_thread_name(self.thread_name.clone())
    }
}

/// `[loader]` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoaderConfig {
    /// How channel selectors are interpreted.
    pub selector_mode: SelectorMode,
}

impl LoaderConfig {
    pub fn with_selector_mode(mut self, selector_mode: SelectorMode) -> Self {
        self.selector_mode = selector_mode;
        self
    }
}

/// `[logging]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Directory for the log file. No file is written when unset.
    pub directory: Option<PathBuf>,
    /// Log file name inside `directory`.
    pub file_name: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            directory: None,
            file_name: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }
}

// =============================================================================
// Config File
// =============================================================================

/// The full configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub executor: ExecutorConfig,
    pub loader: LoaderConfig,
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Loads the file at [`config_file_path`].
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads `path`, or returns the defaults if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(io) => ConfigError::Io(io),
            ini::Error::Parse(parse) => ConfigError::Parse(parse.to_string()),
        })?;
        Self::from_ini(&ini)
    }

    /// Parses configuration text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (section, properties) in ini.iter() {
            let section = section.unwrap_or_default();
            for (key, value) in properties.iter() {
                let value = value.trim();
                match (section, key) {
                    ("executor", "worker_threads") => {
                        config.executor.worker_threads = value
                            .parse()
                            .map_err(|e| ConfigError::invalid(section, key, value, format!("{}", e)))?;
                    }
                    ("executor", "thread_name") => {
                        if value.is_empty() {
                            return Err(ConfigError::invalid(section, key, value, "must not be empty"));
                        }
                        config.executor.thread_name = value.to_string();
                    }
                    ("loader", "selector_mode") => {
                        config.loader.selector_mode = value
                            .parse()
                            .map_err(|e: String| ConfigError::invalid(section, key, value, e))?;
                    }
                    ("logging", "level") => {
                        tracing_subscriber::EnvFilter::try_new(value)
                            .map_err(|e| ConfigError::invalid(section, key, value, e.to_string()))?;
                        config.logging.level = value.to_string();
                    }
                    ("logging", "directory") => {
                        config.logging.directory = (!value.is_empty()).then(|| PathBuf::from(value));
                    }
                    ("logging", "file_name") => {
                        if value.is_empty() {
                            return Err(ConfigError::invalid(section, key, value, "must not be empty"));
                        }
                        config.logging.file_name = value.to_string();
                    }
                    _ => warn!(section, key, "Ignoring unknown config key"),
                }
            }
        }

        Ok(config)
    }

    /// Renders the configuration as INI text.
    pub fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        ini.with_section(Some("executor"))
            .set("worker_threads", self.executor.worker_threads.to_string())
            .set("thread_name", self.executor.thread_name.as_str());
        ini.with_section(Some("loader"))
            .set("selector_mode", self.loader.selector_mode.to_string());

        let directory = self
            .logging
            .directory
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        ini.with_section(Some("logging"))
            .set("level", self.logging.level.as_str())
            .set("directory", directory)
            .set("file_name", self.logging.file_name.as_str());
        ini
    }

    /// Writes the configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }
}
