//! CLI error type.

use std::fmt;

use hdrview::config::ConfigError;
use hdrview::logging::LoggingError;

/// Errors that end a CLI command with a non-zero exit code.
#[derive(Debug)]
pub enum CliError {
    /// The configuration file could not be read.
    Config(ConfigError),
    /// The tracing subscriber could not be installed.
    Logging(LoggingError),
    /// Some of the requested files could not be loaded.
    LoadFailed { failed: usize, total: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(e) => write!(f, "{}", e),
            CliError::Logging(e) => write!(f, "{}", e),
            CliError::LoadFailed { failed, total } => {
                write!(f, "{} of {} file(s) could not be loaded", failed, total)
            }
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::LoadFailed { .. } => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}
