//! Layered settings and credential source resolution.
//!
//! A [`Settings`] value holds four already-loaded layers and answers lookups
//! with the value *and* the layer it came from. Precedence is fixed:
//!
//! 1. explicit overrides (command-line flags, programmatic sets)
//! 2. environment variables
//! 3. the settings file
//! 4. built-in defaults
//!
//! The highest-precedence layer that holds a value wins, even when a lower
//! layer holds the identical text. Empty strings count as unset in every
//! layer.
//!
//! # Example
//!
//! ```rust
//! use hivelink_config::{Environment, Settings, ValueSource};
//!
//! let settings = Settings::new()
//!     .with_environment(Environment::from_pairs([("HIVE_OCM_URL", "https://api.stage.example.com")]))
//!     .with_default("hive_ocm_url", "https://api.example.com");
//!
//! let resolved = settings.resolve("hive_ocm_url").unwrap();
//! assert_eq!(resolved.source, ValueSource::EnvironmentVariable);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::file;

/// The layer a resolved value came from, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Set explicitly for this invocation.
    ExplicitOverride,
    /// Read from the process environment.
    EnvironmentVariable,
    /// Read from the settings file.
    ConfigFile,
    /// Built-in default.
    Default,
}

impl ValueSource {
    /// All sources, highest precedence first.
    pub const PRECEDENCE: [ValueSource; 4] = [
        ValueSource::ExplicitOverride,
        ValueSource::EnvironmentVariable,
        ValueSource::ConfigFile,
        ValueSource::Default,
    ];
}

impl fmt::Display for ValueSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExplicitOverride => write!(f, "explicit override"),
            Self::EnvironmentVariable => write!(f, "environment"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

/// A value together with the layer that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved {
    /// The resolved value.
    pub value: String,
    /// Where the value came from.
    pub source: ValueSource,
}

/// Maps a settings key to its environment variable name.
///
/// `hive_ocm_url` and `hive-ocm-url` both map to `HIVE_OCM_URL`.
#[must_use]
pub fn env_var_name(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            '-' | '.' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// True if values under `key` are credentials.
///
/// Matches settings keys and environment variable names alike.
#[must_use]
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    ["token", "secret", "password"]
        .iter()
        .any(|marker| key.contains(marker))
}

/// Debug view of a value layer with credential values masked.
struct Redacted<'a>(&'a BTreeMap<String, String>);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(key, value)| {
                let shown = if is_secret_key(key) { "<redacted>" } else { value.as_str() };
                (key, shown)
            }))
            .finish()
    }
}

/// A snapshot of environment variables.
///
/// Captured once at startup so that resolution never touches process state.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    /// Captures the current process environment.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    #[must_use]
    pub fn capture() -> Self {
        Self::from_pairs(
            std::env::vars_os()
                .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?))),
        )
    }

    /// Builds an environment from explicit name/value pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns a variable's value; empty values read as unset.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Number of captured variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// True if no variables were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("vars", &Redacted(&self.vars))
            .finish()
    }
}

/// Layered configuration passed explicitly to every consumer.
#[derive(Clone, Default)]
pub struct Settings {
    overrides: BTreeMap<String, String>,
    environment: Environment,
    file_values: BTreeMap<String, String>,
    file_path: Option<PathBuf>,
    defaults: BTreeMap<String, String>,
}

impl Settings {
    /// Creates empty settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads settings from an environment snapshot and an optional file.
    ///
    /// A missing file is not an error: the path is remembered so that later
    /// writes create it. An unreadable or malformed file is.
    pub fn load(environment: Environment, path: Option<&Path>) -> Result<Self> {
        let mut settings = Self::new().with_environment(environment);
        if let Some(path) = path {
            let values = if path.exists() {
                file::read_values(path)?
            } else {
                debug!(path = %path.display(), "settings file does not exist yet");
                BTreeMap::new()
            };
            settings = settings.with_file_values(path, values);
        }
        debug!(
            file_keys = settings.file_values.len(),
            env_vars = settings.environment.len(),
            "loaded settings"
        );
        Ok(settings)
    }

    /// Adds an explicit override.
    #[must_use]
    pub fn with_override(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Adds an override only when a value is present.
    #[must_use]
    pub fn with_optional_override(self, key: impl Into<String>, value: Option<String>) -> Self {
        match value {
            Some(value) => self.with_override(key, value),
            None => self,
        }
    }

    /// Replaces the environment layer.
    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Replaces the settings file layer.
    #[must_use]
    pub fn with_file_values(
        mut self,
        path: impl Into<PathBuf>,
        values: BTreeMap<String, String>,
    ) -> Self {
        self.file_path = Some(path.into());
        self.file_values = values;
        self
    }

    /// Adds a default.
    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.defaults.insert(key.into(), value.into());
        self
    }

    /// Path of the settings file backing the file layer, if any.
    #[must_use]
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Resolves a key to its value and source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::KeyNotFound`] if no layer holds the key.
    pub fn resolve(&self, key: &str) -> Result<Resolved> {
        ValueSource::PRECEDENCE
            .iter()
            .find_map(|&source| {
                self.lookup(source, key).map(|value| Resolved {
                    value: value.to_string(),
                    source,
                })
            })
            .ok_or_else(|| ConfigError::key_not_found(key))
    }

    /// Resolves a key, mapping "not set" to `None`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.resolve(key).ok().map(|r| r.value)
    }

    /// Returns true if any layer holds the key.
    #[must_use]
    pub fn is_set(&self, key: &str) -> bool {
        self.resolve(key).is_ok()
    }

    /// Keys known from overrides, the settings file and defaults.
    ///
    /// The environment cannot be enumerated by key, so environment-only
    /// values are reported only for keys one of the other layers names.
    #[must_use]
    pub fn keys(&self) -> BTreeSet<String> {
        self.overrides
            .keys()
            .chain(self.file_values.keys())
            .chain(self.defaults.keys())
            .cloned()
            .collect()
    }

    fn lookup(&self, source: ValueSource, key: &str) -> Option<&str> {
        let value = match source {
            ValueSource::ExplicitOverride => self.overrides.get(key).map(String::as_str),
            ValueSource::EnvironmentVariable => self.environment.get(&env_var_name(key)),
            ValueSource::ConfigFile => self.file_values.get(key).map(String::as_str),
            ValueSource::Default => self.defaults.get(key).map(String::as_str),
        };
        value.filter(|v| !v.is_empty())
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settings")
            .field("overrides", &Redacted(&self.overrides))
            .field("environment", &self.environment)
            .field("file_values", &Redacted(&self.file_values))
            .field("file_path", &self.file_path)
            .field("defaults", &Redacted(&self.defaults))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn file_layer(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn all_layers() -> Settings {
        Settings::new()
            .with_override("key", "from-override")
            .with_environment(Environment::from_pairs([("KEY", "from-env")]))
            .with_file_values("/tmp/config.toml", file_layer(&[("key", "from-file")]))
            .with_default("key", "from-default")
    }

    #[test_case("hive_ocm_url", "HIVE_OCM_URL" ; "underscores")]
    #[test_case("hive-ocm-url", "HIVE_OCM_URL" ; "dashes")]
    #[test_case("ocm.url", "OCM_URL" ; "dots")]
    fn test_env_var_name(key: &str, expected: &str) {
        assert_eq!(env_var_name(key), expected);
    }

    #[test]
    fn test_override_wins_over_everything() {
        let resolved = all_layers().resolve("key").expect("should resolve");
        assert_eq!(resolved.value, "from-override");
        assert_eq!(resolved.source, ValueSource::ExplicitOverride);
    }

    #[test]
    fn test_env_wins_over_file_and_default() {
        let settings = Settings::new()
            .with_environment(Environment::from_pairs([("KEY", "from-env")]))
            .with_file_values("/tmp/config.toml", file_layer(&[("key", "from-file")]))
            .with_default("key", "from-default");
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::EnvironmentVariable);
        assert_eq!(resolved.value, "from-env");
    }

    #[test]
    fn test_file_wins_over_default() {
        let settings = Settings::new()
            .with_file_values("/tmp/config.toml", file_layer(&[("key", "from-file")]))
            .with_default("key", "from-default");
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::ConfigFile);
    }

    #[test]
    fn test_default_used_last() {
        let settings = Settings::new().with_default("key", "from-default");
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::Default);
        assert_eq!(resolved.value, "from-default");
    }

    #[test]
    fn test_identical_env_and_file_values_report_environment() {
        let settings = Settings::new()
            .with_environment(Environment::from_pairs([("KEY", "same")]))
            .with_file_values("/tmp/config.toml", file_layer(&[("key", "same")]));
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::EnvironmentVariable);
    }

    #[test]
    fn test_identical_override_and_env_values_report_override() {
        let settings = Settings::new()
            .with_override("key", "same")
            .with_environment(Environment::from_pairs([("KEY", "same")]));
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::ExplicitOverride);
    }

    #[test]
    fn test_missing_key_is_not_found() {
        let err = Settings::new().resolve("nope").unwrap_err();
        assert!(matches!(err, ConfigError::KeyNotFound { key } if key == "nope"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let settings = Settings::new()
            .with_override("key", "")
            .with_environment(Environment::from_pairs([("KEY", "")]))
            .with_default("key", "fallback");
        let resolved = settings.resolve("key").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::Default);
    }

    #[test]
    fn test_optional_override() {
        let settings = Settings::new()
            .with_optional_override("a", Some("x".to_string()))
            .with_optional_override("b", None);
        assert!(settings.is_set("a"));
        assert!(!settings.is_set("b"));
    }

    #[test]
    fn test_keys_union() {
        let settings = Settings::new()
            .with_override("a", "1")
            .with_file_values("/tmp/config.toml", file_layer(&[("b", "2")]))
            .with_default("c", "3");
        let keys: Vec<_> = settings.keys().into_iter().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_source_ordering_matches_precedence() {
        let mut sources = ValueSource::PRECEDENCE.to_vec();
        sources.reverse();
        sources.sort();
        assert_eq!(sources, ValueSource::PRECEDENCE.to_vec());
    }

    #[test]
    fn test_load_missing_file_remembers_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let settings = Settings::load(Environment::default(), Some(&path)).expect("should load");
        assert_eq!(settings.file_path(), Some(path.as_path()));
        assert!(settings.keys().is_empty());
    }

    #[test_case("ocm_token", true ; "token key")]
    #[test_case("OCM_CLIENT_SECRET", true ; "secret variable")]
    #[test_case("ocm_url", false ; "url key")]
    fn test_is_secret_key(key: &str, secret: bool) {
        assert_eq!(is_secret_key(key), secret);
    }

    #[test]
    fn test_debug_masks_credentials() {
        let settings = Settings::new()
            .with_environment(Environment::from_pairs([
                ("OCM_URL", "https://api.openshift.com"),
                ("OCM_TOKEN", "env-access-token"),
                ("OCM_CLIENT_SECRET", "env-client-secret"),
            ]))
            .with_override("ocm_refresh_token", "override-refresh-token")
            .with_file_values("/tmp/config.toml", file_layer(&[("ocm_client_secret", "file-secret")]));

        let rendered = format!("{settings:?}");
        for secret in ["env-access-token", "env-client-secret", "override-refresh-token", "file-secret"] {
            assert!(!rendered.contains(secret), "{secret} leaked: {rendered}");
        }
        assert!(rendered.contains("https://api.openshift.com"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_load_reads_file_layer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "hive_ocm_url = \"https://api.int.example.com\"\n").expect("write");

        let settings = Settings::load(Environment::default(), Some(&path)).expect("should load");
        let resolved = settings.resolve("hive_ocm_url").expect("should resolve");
        assert_eq!(resolved.source, ValueSource::ConfigFile);
        assert_eq!(resolved.value, "https://api.int.example.com");
    }
}
