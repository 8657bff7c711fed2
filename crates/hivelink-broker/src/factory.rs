//! Kubernetes client construction.
//!
//! Every call logs in afresh. Clients are never pooled or cached, and each
//! one borrows the [`Connection`] it was built from, so it cannot outlive it.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{ClusterRecord, KubeApi, KubeObject, KubeResource};
use crate::connection::Connection;
use crate::elevation::ElevationRequest;
use crate::error::Result;

/// Privilege tier of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientVariant {
    /// The caller's own identity.
    Standard,
    /// A temporary administrative identity scoped to a reason.
    Elevated,
}

impl fmt::Display for ClientVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Elevated => f.write_str("elevated"),
        }
    }
}

/// A logged-in client for one cluster.
pub struct KubeClient<'c> {
    variant: ClientVariant,
    cluster: ClusterRecord,
    api: Box<dyn KubeApi>,
    elevation: Option<ElevationRequest>,
    connection: &'c Connection,
}

impl KubeClient<'_> {
    /// Privilege tier.
    #[must_use]
    pub fn variant(&self) -> ClientVariant {
        self.variant
    }

    /// The cluster this client is bound to.
    #[must_use]
    pub fn cluster(&self) -> &ClusterRecord {
        &self.cluster
    }

    /// The connection this client was built from.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        self.connection
    }

    /// The elevation reason, for elevated clients.
    #[must_use]
    pub fn elevation_reason(&self) -> Option<&str> {
        self.elevation.as_ref().map(ElevationRequest::reason)
    }

    /// Lists objects of a resource.
    ///
    /// # Errors
    ///
    /// Returns the backend error for the list call.
    pub async fn list(&self, resource: &KubeResource) -> Result<Vec<KubeObject>> {
        debug!(
            cluster_id = self.cluster.internal_id(),
            variant = %self.variant,
            %resource,
            "listing"
        );
        self.api.list(resource).await
    }
}

impl fmt::Debug for KubeClient<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("variant", &self.variant)
            .field("cluster", &self.cluster.internal_id())
            .field("connection", &self.connection.id())
            .field("elevation", &self.elevation)
            .finish_non_exhaustive()
    }
}

/// Builds a standard client for `cluster` through `connection`.
///
/// # Errors
///
/// Returns `Login` if credential exchange fails and `Unreachable` if the
/// cluster cannot be reached.
pub async fn new_standard_client<'c>(
    cluster: &ClusterRecord,
    connection: &'c Connection,
) -> Result<KubeClient<'c>> {
    let api = connection.session().login(cluster, None).await?;
    info!(
        cluster_id = cluster.internal_id(),
        connection = %connection.id(),
        "built standard client"
    );
    Ok(KubeClient {
        variant: ClientVariant::Standard,
        cluster: cluster.clone(),
        api,
        elevation: None,
        connection,
    })
}

/// Builds an elevated client for `cluster` through `connection`.
///
/// The reason is checked before any network call.
///
/// # Errors
///
/// Returns `MissingReason` for a blank reason, otherwise as
/// [`new_standard_client`].
pub async fn new_elevated_client<'c>(
    cluster: &ClusterRecord,
    connection: &'c Connection,
    reason: &str,
) -> Result<KubeClient<'c>> {
    let elevation = ElevationRequest::new(reason, cluster)?;
    new_elevated_client_for(cluster, connection, elevation).await
}

/// Builds an elevated client for `cluster` from an existing request.
///
/// The request's scope is checked before any network call.
///
/// # Errors
///
/// Returns `ElevationScope` if `elevation` was created for another cluster,
/// otherwise as [`new_standard_client`].
pub async fn new_elevated_client_for<'c>(
    cluster: &ClusterRecord,
    connection: &'c Connection,
    elevation: ElevationRequest,
) -> Result<KubeClient<'c>> {
    elevation.ensure_applies_to(cluster)?;
    let api = connection.session().login(cluster, Some(&elevation)).await?;
    info!(
        cluster_id = cluster.internal_id(),
        connection = %connection.id(),
        "built elevated client"
    );
    Ok(KubeClient {
        variant: ClientVariant::Elevated,
        cluster: cluster.clone(),
        api,
        elevation: Some(elevation),
        connection,
    })
}

/// Builds clients against a default connection or an explicit one.
#[derive(Debug, Clone, Copy)]
pub struct ClientFactory<'c> {
    default: &'c Connection,
}

impl<'c> ClientFactory<'c> {
    /// Creates a factory whose default connection is `default`.
    #[must_use]
    pub fn new(default: &'c Connection) -> Self {
        Self { default }
    }

    /// Standard client through the default connection.
    ///
    /// # Errors
    ///
    /// As [`new_standard_client`].
    pub async fn standard(&self, cluster: &ClusterRecord) -> Result<KubeClient<'c>> {
        new_standard_client(cluster, self.default).await
    }

    /// Standard client through an explicit connection.
    ///
    /// # Errors
    ///
    /// As [`new_standard_client`].
    pub async fn standard_with<'x>(
        &self,
        cluster: &ClusterRecord,
        connection: &'x Connection,
    ) -> Result<KubeClient<'x>> {
        new_standard_client(cluster, connection).await
    }

    /// Elevated client through the default connection.
    ///
    /// # Errors
    ///
    /// As [`new_elevated_client`].
    pub async fn elevated(&self, cluster: &ClusterRecord, reason: &str) -> Result<KubeClient<'c>> {
        new_elevated_client(cluster, self.default, reason).await
    }

    /// Elevated client through an explicit connection.
    ///
    /// # Errors
    ///
    /// As [`new_elevated_client`].
    pub async fn elevated_with<'x>(
        &self,
        cluster: &ClusterRecord,
        connection: &'x Connection,
        reason: &str,
    ) -> Result<KubeClient<'x>> {
        new_elevated_client(cluster, connection, reason).await
    }
}
