//! Error types for configuration resolution.
//!
//! Covers lookups in the layered settings, endpoint documents read from disk,
//! and the settings file store.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The key is not set in any configuration source.
    #[error("configuration key '{key}' not found")]
    KeyNotFound {
        /// The key that was looked up.
        key: String,
    },

    /// A config file could not be read.
    #[error("can't read config file '{}': {source}", .path.display())]
    FileNotFound {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A config file exists but has no content.
    #[error("empty config file '{}'", .path.display())]
    EmptyFile {
        /// Path that was read.
        path: PathBuf,
    },

    /// A config file could not be parsed.
    #[error("can't parse config file '{}': {message}", .path.display())]
    Parse {
        /// Path that was read.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// Required credential fields are absent.
    #[error("missing credentials: {missing}")]
    MissingCredentials {
        /// Human-readable list of what is missing.
        missing: String,
    },

    /// A configuration value is absent, empty or malformed.
    #[error("invalid config: {reason}")]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: String,
    },

    /// No settings file location could be determined.
    #[error("no config file in use")]
    NoConfigFile,

    /// Writing the settings file failed.
    #[error("error writing config to file '{}': {source}", .path.display())]
    Write {
        /// Path that was written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl ConfigError {
    /// Creates a `KeyNotFound` error for a key.
    #[must_use]
    pub fn key_not_found(key: impl Into<String>) -> Self {
        Self::KeyNotFound { key: key.into() }
    }

    /// Creates an `EmptyFile` error for a path.
    #[must_use]
    pub fn empty_file(path: impl Into<PathBuf>) -> Self {
        Self::EmptyFile { path: path.into() }
    }

    /// Creates a `Parse` error for a path.
    #[must_use]
    pub fn parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a `MissingCredentials` error.
    #[must_use]
    pub fn missing_credentials(missing: impl Into<String>) -> Self {
        Self::MissingCredentials {
            missing: missing.into(),
        }
    }

    /// Creates an `InvalidConfig` error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns true if the error means a value was simply not configured.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::KeyNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_display() {
        let err = ConfigError::key_not_found("hive_ocm_url");
        assert_eq!(err.to_string(), "configuration key 'hive_ocm_url' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let err = ConfigError::empty_file("/tmp/ocm.json");
        assert_eq!(err.to_string(), "empty config file '/tmp/ocm.json'");

        let err = ConfigError::parse("/tmp/ocm.json", "expected value");
        assert!(err.to_string().contains("can't parse config file"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_file_not_found_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = ConfigError::FileNotFound {
            path: PathBuf::from("/nonexistent/ocm.json"),
            source: io,
        };
        assert!(err.to_string().contains("can't read config file"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
