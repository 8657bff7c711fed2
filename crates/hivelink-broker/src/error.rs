//! Error types for the connection broker.
//!
//! Every error maps to one [`ErrorKind`] of the broker's taxonomy and carries
//! the identifier, cluster or client variant needed to diagnose it without
//! re-running.

use hivelink_config::ConfigError;
use serde::Serialize;
use thiserror::Error;

use crate::factory::ClientVariant;

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Broad classification of broker failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Missing or invalid credentials, files or settings.
    Configuration,
    /// A cluster or its Hive could not be resolved.
    Resolution,
    /// Token exchange or cluster login was rejected.
    Authentication,
    /// An endpoint could not be reached.
    Network,
    /// A missing elevation reason or a failed post-build check.
    Validation,
    /// The run was cancelled.
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configuration => "configuration",
            Self::Resolution => "resolution",
            Self::Authentication => "authentication",
            Self::Network => "network",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Errors that can occur while brokering connections and clients.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Configuration could not be resolved or loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// No cluster matched the identifier.
    #[error("cluster '{identifier}' not found")]
    ClusterNotFound {
        /// The identifier as given.
        identifier: String,
    },

    /// More than one cluster matched the identifier.
    #[error("identifier '{identifier}' matches {count} clusters: {candidates}")]
    AmbiguousCluster {
        /// The identifier as given.
        identifier: String,
        /// Number of matches.
        count: usize,
        /// Comma-separated `name (id)` list of the matches.
        candidates: String,
    },

    /// The target cluster has no associated Hive.
    #[error("hive cluster for cluster '{cluster_id}' not found: {reason}")]
    HiveNotFound {
        /// Internal ID of the target cluster.
        cluster_id: String,
        /// What was missing.
        reason: String,
    },

    /// Token exchange against a control plane failed.
    #[error("authentication against '{url}' failed: {reason}")]
    Authentication {
        /// Control-plane URL.
        url: String,
        /// Reason reported by the backend.
        reason: String,
    },

    /// Per-cluster credential exchange failed.
    #[error("failed to login to cluster '{cluster_id}': {reason}")]
    Login {
        /// Internal ID of the cluster.
        cluster_id: String,
        /// Reason reported by the backend.
        reason: String,
    },

    /// A cluster or control plane could not be reached.
    #[error("'{target}' is unreachable: {reason}")]
    Unreachable {
        /// Cluster ID or URL.
        target: String,
        /// Underlying transport error.
        reason: String,
    },

    /// An elevated client was requested without a reason.
    #[error("an elevation reason is required for elevated access to cluster '{cluster_id}'")]
    MissingReason {
        /// Internal ID of the cluster.
        cluster_id: String,
    },

    /// An elevation request was used for a cluster it is not scoped to.
    #[error("elevation request for cluster '{requested}' cannot be used for cluster '{cluster_id}'")]
    ElevationScope {
        /// Cluster the request was created for.
        requested: String,
        /// Cluster the client was being built for.
        cluster_id: String,
    },

    /// A built client failed its sanity check.
    #[error("{variant} client for cluster '{cluster_id}' failed validation: {reason}")]
    Validation {
        /// Which client variant failed.
        variant: ClientVariant,
        /// Internal ID of the cluster.
        cluster_id: String,
        /// What failed.
        reason: String,
    },

    /// A backend request returned an error response.
    #[error("request to '{target}' failed{}: {reason}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Api {
        /// Cluster ID or URL.
        target: String,
        /// HTTP status, if any.
        status: Option<u16>,
        /// Response body or transport message.
        reason: String,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

impl BrokerError {
    /// Creates a `ClusterNotFound` error.
    #[must_use]
    pub fn cluster_not_found(identifier: impl Into<String>) -> Self {
        Self::ClusterNotFound {
            identifier: identifier.into(),
        }
    }

    /// Creates a `HiveNotFound` error.
    #[must_use]
    pub fn hive_not_found(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::HiveNotFound {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Authentication` error.
    #[must_use]
    pub fn authentication(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Authentication {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Login` error.
    #[must_use]
    pub fn login(cluster_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Login {
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Unreachable` error.
    #[must_use]
    pub fn unreachable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates a `Validation` error.
    #[must_use]
    pub fn validation(
        variant: ClientVariant,
        cluster_id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Validation {
            variant,
            cluster_id: cluster_id.into(),
            reason: reason.into(),
        }
    }

    /// Creates an `Api` error.
    #[must_use]
    pub fn api(target: impl Into<String>, status: Option<u16>, reason: impl Into<String>) -> Self {
        Self::Api {
            target: target.into(),
            status,
            reason: reason.into(),
        }
    }

    /// Classifies the error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Configuration,
            Self::ClusterNotFound { .. }
            | Self::AmbiguousCluster { .. }
            | Self::HiveNotFound { .. } => ErrorKind::Resolution,
            Self::Authentication { .. } | Self::Login { .. } => ErrorKind::Authentication,
            Self::Api {
                status: Some(401 | 403),
                ..
            } => ErrorKind::Authentication,
            Self::Unreachable { .. } | Self::Api { .. } => ErrorKind::Network,
            Self::MissingReason { .. }
            | Self::ElevationScope { .. }
            | Self::Validation { .. } => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
