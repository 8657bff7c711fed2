//! Reason-scoped elevation requests.

use std::fmt;

use crate::backend::ClusterRecord;
use crate::error::{BrokerError, Result};

/// A request for a temporary administrative identity on one cluster.
///
/// Created for a single elevated client build and moved into the resulting
/// client. Not `Clone`, not serializable.
#[derive(PartialEq, Eq)]
pub struct ElevationRequest {
    reason: String,
    target_cluster: String,
}

impl ElevationRequest {
    /// Creates a request for `cluster` with a trimmed, non-empty reason.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::MissingReason`] if `reason` is empty or only
    /// whitespace.
    pub fn new(reason: &str, cluster: &ClusterRecord) -> Result<Self> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(BrokerError::MissingReason {
                cluster_id: cluster.internal_id().to_string(),
            });
        }
        Ok(Self {
            reason: reason.to_string(),
            target_cluster: cluster.internal_id().to_string(),
        })
    }

    /// The stated reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// Internal ID of the cluster the request is scoped to.
    #[must_use]
    pub fn target_cluster(&self) -> &str {
        &self.target_cluster
    }

    /// True if the request is scoped to `cluster`.
    #[must_use]
    pub fn applies_to(&self, cluster: &ClusterRecord) -> bool {
        self.target_cluster == cluster.internal_id()
    }

    /// Checks that the request is scoped to `cluster`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ElevationScope`] for any other cluster.
    pub fn ensure_applies_to(&self, cluster: &ClusterRecord) -> Result<()> {
        if self.applies_to(cluster) {
            Ok(())
        } else {
            Err(BrokerError::ElevationScope {
                requested: self.target_cluster.clone(),
                cluster_id: cluster.internal_id().to_string(),
            })
        }
    }
}

impl fmt::Debug for ElevationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevationRequest")
            .field("target_cluster", &self.target_cluster)
            .field("reason_len", &self.reason.len())
            .finish()
    }
}
