//! CLI error types.

use hivelink_broker::{BrokerError, RunError};
use hivelink_config::ConfigError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    /// Settings could not be read or written.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A broker operation failed outside a run.
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// The hive-login run failed at a step.
    #[error("hive login failed: {0}")]
    Run(#[from] RunError),

    /// Output formatting error.
    #[error("format error: {0}")]
    Format(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
