//! Configuration for hivelink.
//!
//! This crate answers two questions for the connection broker:
//!
//! - *Where does a setting come from?* [`Settings`] resolves keys across
//!   explicit overrides, the environment, the settings file and defaults,
//!   reporting the winning [`ValueSource`].
//! - *How do I reach a backend?* [`Endpoint`] describes one control-plane
//!   deployment, read from settings or from a JSON document on disk.
//!
//! Nothing here performs network I/O, and nothing reads the process
//! environment after [`Environment::capture`].
//!
//! # Example
//!
//! ```rust
//! use hivelink_config::{Endpoint, Environment, Settings};
//!
//! let settings = Settings::new().with_environment(Environment::from_pairs([
//!     ("OCM_URL", "https://api.openshift.com"),
//!     ("OCM_TOKEN", "token"),
//! ]));
//! let endpoint = Endpoint::from_settings(&settings)?;
//! assert_eq!(endpoint.url(), Some("https://api.openshift.com"));
//! # Ok::<(), hivelink_config::ConfigError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod endpoint;
pub mod error;
pub mod file;
pub mod settings;

pub use endpoint::{Credentials, DEFAULT_API_URL, Endpoint};
pub use error::{ConfigError, Result};
pub use settings::{Environment, Resolved, Settings, ValueSource, env_var_name, is_secret_key};

/// Settings key naming the companion environment's API URL.
pub const HIVE_URL_KEY: &str = "hive_ocm_url";

/// Settings key naming the backplane API URL of the target's environment.
pub const BACKPLANE_URL_KEY: &str = "backplane_url";

/// Settings key naming the backplane API URL of the Hive's environment.
pub const HIVE_BACKPLANE_URL_KEY: &str = "hive_backplane_url";
