//! Settings file store.
//!
//! The settings file is a flat TOML table of scalar values. Nested tables
//! are ignored on read and preserved on write.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{ConfigError, Result};

/// Environment variable that overrides the settings file location.
pub const CONFIG_PATH_ENV: &str = "HIVELINK_CONFIG";

/// Returns the default settings file path.
///
/// `$HIVELINK_CONFIG` when set, otherwise `<config dir>/hivelink/config.toml`.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    if let Some(custom) = std::env::var_os(CONFIG_PATH_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(custom));
    }
    dirs::config_dir().map(|base| base.join("hivelink").join("config.toml"))
}

/// Reads the scalar values of a settings file as strings.
pub fn read_values(path: &Path) -> Result<BTreeMap<String, String>> {
    let table = read_table(path)?;
    let mut values = BTreeMap::new();
    for (key, value) in table {
        match value {
            toml::Value::String(s) => {
                values.insert(key, s);
            }
            toml::Value::Integer(_)
            | toml::Value::Float(_)
            | toml::Value::Boolean(_)
            | toml::Value::Datetime(_) => {
                values.insert(key, value.to_string());
            }
            toml::Value::Array(_) | toml::Value::Table(_) => {
                warn!(key = %key, path = %path.display(), "ignoring non-scalar settings value");
            }
        }
    }
    Ok(values)
}

/// Sets one key in the settings file, creating the file if needed.
pub fn write_value(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut table = if path.exists() {
        read_table(path)?
    } else {
        toml::Table::new()
    };
    table.insert(key.to_string(), toml::Value::String(value.to_string()));

    let serialized = toml::to_string_pretty(&table)
        .map_err(|e| ConfigError::invalid_config(format!("serializing settings: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })?;
    }
    std::fs::write(path, serialized).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(key = %key, path = %path.display(), "wrote settings value");
    Ok(())
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileNotFound {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::parse(path, e.to_string()))
}
