//! Common types and utilities shared across CLI commands.

use std::path::PathBuf;

use hdrview::config::ConfigFile;
use hdrview::image::SelectorMode;
use hdrview::logging::{init_logging, WorkerGuard};

use crate::error::CliError;

/// Options accepted by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Configuration plus the logging guard, held for the duration of a command.
pub struct Session {
    pub config: ConfigFile,
    _log_guard: Option<WorkerGuard>,
}

impl Session {
    /// Loads the configuration and installs logging.
    pub fn start(global: &GlobalArgs) -> Result<Self, CliError> {
        let mut config = match &global.config {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };
        if global.verbose {
            config.logging.level = "debug".to_string();
        }

        let log_guard = init_logging(&config.logging)?;
        tracing::debug!(?config, "Configuration loaded");

        Ok(Self {
            config,
            _log_guard: log_guard,
        })
    }
}

/// Resolve the selector mode: `--regex` wins, then the config file.
pub fn resolve_selector_mode(regex_flag: bool, config: &ConfigFile) -> SelectorMode {
    if regex_flag {
        SelectorMode::Regex
    } else {
        config.loader.selector_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdrview::config::LoaderConfig;

    #[test]
    fn test_flag_overrides_config() {
        let mut config = ConfigFile::default();
        assert_eq!(resolve_selector_mode(false, &config), SelectorMode::Fuzzy);
        assert_eq!(resolve_selector_mode(true, &config), SelectorMode::Regex);

        config.loader = LoaderConfig::default().with_selector_mode(SelectorMode::Regex);
        assert_eq!(resolve_selector_mode(false, &config), SelectorMode::Regex);
    }
}
