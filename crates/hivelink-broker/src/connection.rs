//! Authenticated connections and the builder that opens them.
//!
//! A [`Connection`] owns exactly one backend [`Session`]. The session is
//! released exactly once: either by [`Connection::close`] or, on any other
//! exit path (errors, cancellation, panics unwinding), when the connection
//! is dropped.

use std::fmt;
use std::path::Path;

use hivelink_config::{ConfigError, DEFAULT_API_URL, Endpoint, Settings};
use tracing::{debug, info};
use uuid::Uuid;

use crate::backend::{ControlPlane, Session};
use crate::error::Result;

/// An open, authenticated session bound to one endpoint.
pub struct Connection {
    id: Uuid,
    endpoint: Endpoint,
    session: Box<dyn Session>,
    closed: bool,
}

impl Connection {
    fn new(endpoint: Endpoint, session: Box<dyn Session>) -> Self {
        Self {
            id: Uuid::new_v4(),
            endpoint,
            session,
            closed: false,
        }
    }

    /// Unique ID of this connection, used in logs.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The endpoint this connection was opened against.
    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The control-plane URL.
    #[must_use]
    pub fn url(&self) -> &str {
        self.endpoint.url_or_default()
    }

    /// The underlying session.
    #[must_use]
    pub fn session(&self) -> &dyn Session {
        self.session.as_ref()
    }

    /// Closes the connection.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.session.close();
        debug!(connection = %self.id, url = %self.url(), "closed connection");
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Where a connection's endpoint comes from.
#[derive(Debug, Clone, Copy)]
pub enum BuildMode<'m> {
    /// Endpoint fields from the layered settings (environment first).
    FromEnvironment(&'m Settings),
    /// Endpoint document on disk.
    FromFile(&'m Path),
    /// An existing endpoint with only its URL replaced.
    FromConfigWithOverride {
        /// The endpoint to clone. `None` or empty is rejected.
        config: Option<&'m Endpoint>,
        /// The replacement URL.
        url: &'m str,
    },
}

impl BuildMode<'_> {
    fn name(&self) -> &'static str {
        match self {
            Self::FromEnvironment(_) => "environment",
            Self::FromFile(_) => "file",
            Self::FromConfigWithOverride { .. } => "config-with-override",
        }
    }
}

/// Opens connections through a [`ControlPlane`].
#[derive(Clone, Copy)]
pub struct ConnectionBuilder<'a> {
    control_plane: &'a dyn ControlPlane,
}

impl<'a> ConnectionBuilder<'a> {
    /// Creates a builder over a control plane.
    #[must_use]
    pub fn new(control_plane: &'a dyn ControlPlane) -> Self {
        Self { control_plane }
    }

    /// Resolves the endpoint for `mode` and opens a connection.
    ///
    /// # Errors
    ///
    /// - configuration errors from reading the endpoint, before any network
    ///   call is made
    /// - `Authentication` or `Unreachable` from opening the session
    ///
    /// No connection exists after an error.
    pub async fn build(&self, mode: BuildMode<'_>) -> Result<Connection> {
        let endpoint = Self::endpoint_for(mode)?;
        debug!(mode = mode.name(), url = %endpoint.url_or_default(), "building connection");
        self.open(endpoint).await
    }

    /// Opens a connection to an already resolved endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` or `Unreachable` from the control plane.
    pub async fn open(&self, endpoint: Endpoint) -> Result<Connection> {
        let session = self.control_plane.open(&endpoint).await?;
        let connection = Connection::new(endpoint, session);
        info!(connection = %connection.id, url = %connection.url(), "opened connection");
        Ok(connection)
    }

    /// Resolves the endpoint a mode describes without opening anything.
    ///
    /// # Errors
    ///
    /// Returns the configuration error for the mode.
    pub fn endpoint_for(mode: BuildMode<'_>) -> Result<Endpoint> {
        let endpoint = match mode {
            BuildMode::FromEnvironment(settings) => Endpoint::from_settings(settings)?,
            BuildMode::FromFile(path) => {
                let endpoint = Endpoint::from_file(path)?;
                if endpoint.credentials().is_none() {
                    return Err(ConfigError::missing_credentials(format!(
                        "no token or client credentials in '{}'",
                        path.display()
                    ))
                    .into());
                }
                if endpoint.url().is_none() {
                    endpoint.with_url(DEFAULT_API_URL)
                } else {
                    endpoint
                }
            }
            BuildMode::FromConfigWithOverride { config, url } => {
                let Some(config) = config.filter(|c| !c.is_empty()) else {
                    return Err(ConfigError::invalid_config("no endpoint to clone").into());
                };
                if url.trim().is_empty() {
                    return Err(ConfigError::invalid_config("override url is empty").into());
                }
                let parsed = url::Url::parse(url).map_err(|e| {
                    ConfigError::invalid_config(format!("override url '{url}' is invalid: {e}"))
                })?;
                if !matches!(parsed.scheme(), "http" | "https") || !parsed.has_host() {
                    return Err(ConfigError::invalid_config(format!(
                        "override url '{url}' is not an http(s) url"
                    ))
                    .into());
                }
                config.with_url(url)
            }
        };
        Ok(endpoint)
    }
}

impl fmt::Debug for ConnectionBuilder<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionBuilder").finish_non_exhaustive()
    }
}
