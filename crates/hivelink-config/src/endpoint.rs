//! Backend endpoint descriptions.
//!
//! An [`Endpoint`] is the static description of one control-plane
//! deployment: its URL plus whichever credentials reach it. Endpoints come
//! from three places:
//!
//! - the layered [`Settings`] (environment variables such as `OCM_URL` and
//!   `OCM_TOKEN`, or the settings file)
//! - a JSON document on disk
//! - an existing endpoint cloned with a different URL
//!
//! Endpoints never change after construction. [`Endpoint::with_url`] returns
//! a new value.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, Result};
use crate::settings::Settings;

/// API URL used when an endpoint document does not name one.
pub const DEFAULT_API_URL: &str = "https://api.openshift.com";

/// Settings key for the API URL.
pub const URL_KEY: &str = "ocm_url";
/// Settings key for the bearer access token.
pub const ACCESS_TOKEN_KEY: &str = "ocm_token";
/// Settings key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "ocm_refresh_token";
/// Settings key for the client id.
pub const CLIENT_ID_KEY: &str = "ocm_client_id";
/// Settings key for the client secret.
pub const CLIENT_SECRET_KEY: &str = "ocm_client_secret";

/// Credentials carried by an endpoint, in the order they are preferred.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum Credentials<'a> {
    /// A bearer token, a refresh token, or both.
    Bearer {
        /// Access token, used as-is.
        access_token: Option<&'a str>,
        /// Refresh token, exchanged for an access token.
        refresh_token: Option<&'a str>,
    },
    /// An OAuth client id and secret.
    ClientCredentials {
        /// Client id.
        client_id: &'a str,
        /// Client secret.
        client_secret: &'a str,
    },
}

impl fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer {
                access_token,
                refresh_token,
            } => f
                .debug_struct("Bearer")
                .field("access_token", &access_token.map(|_| "<redacted>"))
                .field("refresh_token", &refresh_token.map(|_| "<redacted>"))
                .finish(),
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// URL and credentials of one backend deployment.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "accessToken")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "refreshToken")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        alias = "clientID",
        alias = "clientId"
    )]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "clientSecret")]
    client_secret: Option<String>,
}

impl Endpoint {
    /// Creates an endpoint with a URL and no credentials.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: non_empty(url.into()),
            ..Self::default()
        }
    }

    /// Sets the bearer access token.
    #[must_use]
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = non_empty(token.into());
        self
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = non_empty(token.into());
        self
    }

    /// Sets the client id and secret.
    #[must_use]
    pub fn with_client_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = non_empty(client_id.into());
        self.client_secret = non_empty(client_secret.into());
        self
    }

    /// Returns a copy of this endpoint pointing at a different URL.
    ///
    /// Credentials are carried over unchanged; `self` is not modified.
    #[must_use]
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: non_empty(url.into()),
            ..self.clone()
        }
    }

    /// Reads an endpoint from the layered settings.
    ///
    /// Requires a URL and either a bearer/refresh token or a client id and
    /// secret pair.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredentials`] naming what is absent.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = Self {
            access_token: settings.get(ACCESS_TOKEN_KEY),
            refresh_token: settings.get(REFRESH_TOKEN_KEY),
            url: settings.get(URL_KEY),
            client_id: settings.get(CLIENT_ID_KEY),
            client_secret: settings.get(CLIENT_SECRET_KEY),
        };

        let mut missing = Vec::new();
        if endpoint.url.is_none() {
            missing.push(crate::env_var_name(URL_KEY));
        }
        if endpoint.credentials().is_none() {
            missing.push(format!(
                "{} or {}+{}",
                crate::env_var_name(ACCESS_TOKEN_KEY),
                crate::env_var_name(CLIENT_ID_KEY),
                crate::env_var_name(CLIENT_SECRET_KEY)
            ));
        }
        if !missing.is_empty() {
            return Err(ConfigError::missing_credentials(missing.join(", ")));
        }

        debug!(url = ?endpoint.url, "built endpoint from settings");
        Ok(endpoint)
    }

    /// Reads an endpoint from a JSON document.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::FileNotFound`] if the file cannot be read
    /// - [`ConfigError::EmptyFile`] if it has no content
    /// - [`ConfigError::Parse`] if it is not a valid endpoint document
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::FileNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        if content.trim().is_empty() {
            return Err(ConfigError::empty_file(path));
        }
        let endpoint = Self::from_json(&content).map_err(|e| ConfigError::parse(path, e.to_string()))?;
        debug!(path = %path.display(), url = ?endpoint.url, "read endpoint from file");
        Ok(endpoint)
    }

    /// Parses an endpoint from a JSON string.
    ///
    /// Empty strings in the document are treated as absent fields.
    pub fn from_json(content: &str) -> std::result::Result<Self, serde_json::Error> {
        let raw: Self = serde_json::from_str(content)?;
        Ok(Self {
            access_token: raw.access_token.and_then(non_empty),
            refresh_token: raw.refresh_token.and_then(non_empty),
            url: raw.url.and_then(non_empty),
            client_id: raw.client_id.and_then(non_empty),
            client_secret: raw.client_secret.and_then(non_empty),
        })
    }

    /// The configured URL, if any.
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// The configured URL, or [`DEFAULT_API_URL`].
    #[must_use]
    pub fn url_or_default(&self) -> &str {
        self.url.as_deref().unwrap_or(DEFAULT_API_URL)
    }

    /// The bearer access token, if any.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// The refresh token, if any.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// The client id, if any.
    #[must_use]
    pub fn client_id(&self) -> Option<&str> {
        self.client_id.as_deref()
    }

    /// The usable credentials, preferring tokens over client credentials.
    #[must_use]
    pub fn credentials(&self) -> Option<Credentials<'_>> {
        if self.access_token.is_some() || self.refresh_token.is_some() {
            return Some(Credentials::Bearer {
                access_token: self.access_token.as_deref(),
                refresh_token: self.refresh_token.as_deref(),
            });
        }
        match (self.client_id.as_deref(), self.client_secret.as_deref()) {
            (Some(client_id), Some(client_secret)) => Some(Credentials::ClientCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        }
    }

    /// True if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.access_token.is_none()
            && self.refresh_token.is_none()
            && self.client_id.is_none()
            && self.client_secret.is_none()
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url)
            .field("credentials", &self.credentials())
            .finish()
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Environment;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn full_endpoint() -> Endpoint {
        Endpoint::new("https://api.openshift.com")
            .with_access_token("test-access-token")
            .with_refresh_token("test-refresh-token")
            .with_client_credentials("test-client-id", "test-client-secret")
    }

    fn write_temp(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("should create temp file");
        file.write_all(content.as_bytes()).expect("should write");
        file
    }

    #[test]
    fn test_from_file_valid() {
        let json = serde_json::to_string(&full_endpoint()).expect("serialize");
        let file = write_temp(&json);

        let endpoint = Endpoint::from_file(file.path()).expect("should parse");
        assert_eq!(endpoint, full_endpoint());
    }

    #[test]
    fn test_from_file_missing() {
        let err = Endpoint::from_file("/nonexistent/path/ocm.json").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
        assert!(err.to_string().contains("can't read config file"));
    }

    #[test]
    fn test_from_file_empty() {
        let file = write_temp("");
        let err = Endpoint::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyFile { .. }));
        assert!(err.to_string().contains("empty config file"));
    }

    #[test]
    fn test_from_file_invalid_json() {
        let file = write_temp("{invalid json}");
        let err = Endpoint::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("can't parse config file"));
    }

    #[test]
    fn test_from_file_partial_client_credentials() {
        let file = write_temp(r#"{"client_id":"id","client_secret":"secret"}"#);
        let endpoint = Endpoint::from_file(file.path()).expect("should parse");
        assert_eq!(endpoint.url(), None);
        assert_eq!(endpoint.url_or_default(), DEFAULT_API_URL);
        assert!(matches!(
            endpoint.credentials(),
            Some(Credentials::ClientCredentials { client_id: "id", .. })
        ));
    }

    #[test]
    fn test_from_json_accepts_camel_case() {
        let endpoint = Endpoint::from_json(
            r#"{"accessToken":"tok","url":"https://api.stage.example.com","clientID":"cid"}"#,
        )
        .expect("should parse");
        assert_eq!(endpoint.access_token(), Some("tok"));
        assert_eq!(endpoint.client_id(), Some("cid"));
        assert_eq!(endpoint.url(), Some("https://api.stage.example.com"));
    }

    #[test]
    fn test_from_json_blank_fields_are_absent() {
        let endpoint = Endpoint::from_json(r#"{"access_token":"","url":"  "}"#).expect("parse");
        assert!(endpoint.is_empty());
    }

    #[test]
    fn test_with_url_does_not_mutate_source() {
        let original = full_endpoint();
        let moved = original.with_url("https://api.stage.openshift.com");

        assert_eq!(original.url(), Some("https://api.openshift.com"));
        assert_eq!(moved.url(), Some("https://api.stage.openshift.com"));
        assert_eq!(moved.access_token(), original.access_token());
        assert_eq!(moved.client_id(), original.client_id());
    }

    #[test]
    fn test_credentials_prefer_tokens() {
        let endpoint = full_endpoint();
        assert!(matches!(endpoint.credentials(), Some(Credentials::Bearer { .. })));
    }

    #[test]
    fn test_credentials_need_both_client_fields() {
        let endpoint = Endpoint::new("https://x").with_client_credentials("id", "");
        assert!(endpoint.credentials().is_none());
    }

    #[test]
    fn test_from_settings_env_token() {
        let settings = Settings::new().with_environment(Environment::from_pairs([
            ("OCM_URL", "https://api.openshift.com"),
            ("OCM_TOKEN", "abc"),
        ]));
        let endpoint = Endpoint::from_settings(&settings).expect("should build");
        assert_eq!(endpoint.access_token(), Some("abc"));
    }

    #[test]
    fn test_from_settings_missing_url() {
        let settings =
            Settings::new().with_environment(Environment::from_pairs([("OCM_TOKEN", "abc")]));
        let err = Endpoint::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { ref missing } if missing.contains("OCM_URL")));
    }

    #[test]
    fn test_from_settings_missing_tokens() {
        let settings = Settings::new().with_environment(Environment::from_pairs([
            ("OCM_URL", "https://api.openshift.com"),
            ("OCM_CLIENT_ID", "id"),
        ]));
        let err = Endpoint::from_settings(&settings).unwrap_err();
        assert!(matches!(err, ConfigError::MissingCredentials { ref missing } if missing.contains("OCM_TOKEN")));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let rendered = format!("{:?}", full_endpoint());
        assert!(!rendered.contains("test-access-token"));
        assert!(!rendered.contains("test-client-secret"));
        assert!(rendered.contains("https://api.openshift.com"));
    }
}
