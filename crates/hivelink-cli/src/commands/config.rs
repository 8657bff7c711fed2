//! `config` command.

use std::collections::BTreeSet;
use std::io::Write;

use hivelink_config::endpoint::{
    ACCESS_TOKEN_KEY, CLIENT_ID_KEY, CLIENT_SECRET_KEY, REFRESH_TOKEN_KEY, URL_KEY,
};
use hivelink_config::{
    BACKPLANE_URL_KEY, ConfigError, HIVE_BACKPLANE_URL_KEY, HIVE_URL_KEY, Settings, env_var_name,
    file, is_secret_key,
};
use tracing::info;

use crate::cli::ConfigArgs;
use crate::error::CliError;
use crate::output::{ConfigEntry, ConfigListing, OutputFormat};

const KNOWN_KEYS: [&str; 8] = [
    URL_KEY,
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    CLIENT_ID_KEY,
    CLIENT_SECRET_KEY,
    HIVE_URL_KEY,
    BACKPLANE_URL_KEY,
    HIVE_BACKPLANE_URL_KEY,
];

/// Shows settings with their sources, or writes one.
#[derive(Debug)]
pub struct ConfigCommand<'a> {
    settings: &'a Settings,
}

impl<'a> ConfigCommand<'a> {
    /// Create a new command over the loaded settings.
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    /// Execute the command.
    ///
    /// # Errors
    ///
    /// - `KeyNotFound` when showing an unset key
    /// - `NoConfigFile` when writing without a settings file location
    /// - write errors from the settings file or the output
    pub fn execute<W: Write>(
        &self,
        writer: &mut W,
        format: &OutputFormat,
        args: &ConfigArgs,
    ) -> Result<(), CliError> {
        match (&args.key, &args.value) {
            (Some(key), Some(value)) => {
                let path = self.settings.file_path().ok_or(ConfigError::NoConfigFile)?;
                file::write_value(path, key, value)?;
                info!(%key, path = %path.display(), "wrote setting");
                writeln!(writer, "Set '{key}' in '{}'", path.display())?;
            }
            (Some(key), None) => {
                let resolved = self.settings.resolve(key)?;
                let entry = ConfigEntry {
                    key: key.clone(),
                    env_var: env_var_name(key),
                    value: Some(display_value(key, resolved.value)),
                    source: Some(resolved.source),
                };
                format.write(writer, &entry)?;
            }
            (None, _) => format.write(writer, &self.listing())?,
        }
        Ok(())
    }

    /// Every known or configured key with its resolved value.
    #[must_use]
    pub fn listing(&self) -> ConfigListing {
        let keys: BTreeSet<String> = KNOWN_KEYS
            .iter()
            .map(ToString::to_string)
            .chain(self.settings.keys())
            .collect();
        let entries = keys
            .into_iter()
            .map(|key| {
                let resolved = self.settings.resolve(&key).ok();
                ConfigEntry {
                    env_var: env_var_name(&key),
                    value: resolved
                        .as_ref()
                        .map(|r| display_value(&key, r.value.clone())),
                    source: resolved.map(|r| r.source),
                    key,
                }
            })
            .collect();
        ConfigListing {
            file: self.settings.file_path().map(|p| p.display().to_string()),
            entries,
        }
    }
}

fn display_value(key: &str, value: String) -> String {
    if is_secret_key(key) {
        "<redacted>".to_string()
    } else {
        value
    }
}
