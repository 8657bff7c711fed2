//! Post-build client checks.
//!
//! Every client gets one cheap read of cluster operator status. Standard
//! clients also list namespaces. Elevated clients instead get a read that a
//! standard identity cannot perform, which proves the elevated identity took
//! effect.

use std::fmt;

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{KubeObject, KubeResource};
use crate::error::{BrokerError, Result};
use crate::factory::{ClientVariant, KubeClient};

/// Namespace whose pods are listed to prove elevation on a managed cluster.
pub const MONITORING_NAMESPACE: &str = "openshift-monitoring";

/// A privileged read used to prove elevation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElevatedProbe {
    /// List pods in a restricted namespace.
    Pods {
        /// Namespace to list.
        namespace: String,
    },
    /// Find the Hive `ClusterDeployment` of a managed cluster.
    ClusterDeployment {
        /// Internal ID of the managed cluster.
        cluster_id: String,
    },
}

impl ElevatedProbe {
    /// Pods in [`MONITORING_NAMESPACE`].
    #[must_use]
    pub fn monitoring_pods() -> Self {
        Self::Pods {
            namespace: MONITORING_NAMESPACE.to_string(),
        }
    }

    fn resource(&self) -> KubeResource {
        match self {
            Self::Pods { namespace } => KubeResource::Pods {
                namespace: namespace.clone(),
            },
            Self::ClusterDeployment { .. } => KubeResource::ClusterDeployments,
        }
    }
}

impl fmt::Display for ElevatedProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pods { namespace } => write!(f, "list pods in '{namespace}'"),
            Self::ClusterDeployment { cluster_id } => {
                write!(f, "get clusterdeployment for '{cluster_id}'")
            }
        }
    }
}

/// Availability columns of one cluster operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperatorStatus {
    /// Operator name.
    pub name: String,
    /// `Available` condition status.
    pub available: String,
    /// `Progressing` condition status.
    pub progressing: String,
    /// `Degraded` condition status.
    pub degraded: String,
}

impl From<&KubeObject> for OperatorStatus {
    fn from(object: &KubeObject) -> Self {
        Self {
            name: object.name.clone(),
            available: object.condition("Available").to_string(),
            progressing: object.condition("Progressing").to_string(),
            degraded: object.condition("Degraded").to_string(),
        }
    }
}

/// What a successful validation observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Variant that was validated.
    pub variant: ClientVariant,
    /// Internal ID of the cluster.
    pub cluster_id: String,
    /// Operator status from the baseline read.
    pub operators: Vec<OperatorStatus>,
    /// Number of namespaces listed, for standard clients.
    pub namespaces: Option<usize>,
    /// Description of the elevated probe, if one ran.
    pub probe: Option<String>,
    /// Object the probe found, as `namespace/name`, if it looks one up.
    pub probe_object: Option<String>,
}

/// Validates clients with minimal reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionValidator {
    probe: ElevatedProbe,
}

impl Default for SessionValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionValidator {
    /// Creates a validator whose elevated probe lists monitoring pods.
    #[must_use]
    pub fn new() -> Self {
        Self {
            probe: ElevatedProbe::monitoring_pods(),
        }
    }

    /// Sets the elevated probe.
    #[must_use]
    pub fn with_probe(mut self, probe: ElevatedProbe) -> Self {
        self.probe = probe;
        self
    }

    /// Exercises `client`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Validation`] tagged with the client's variant
    /// and cluster. Cancellation passes through unchanged.
    pub async fn validate(&self, client: &KubeClient<'_>) -> Result<ValidationReport> {
        let variant = client.variant();
        let cluster_id = client.cluster().internal_id().to_string();

        let operators = client
            .list(&KubeResource::ClusterOperators)
            .await
            .map_err(|e| tag(variant, &cluster_id, "list clusteroperators", e))?;
        debug!(%variant, %cluster_id, operators = operators.len(), "baseline read succeeded");

        let mut report = ValidationReport {
            variant,
            cluster_id,
            operators: operators.iter().map(OperatorStatus::from).collect(),
            namespaces: None,
            probe: None,
            probe_object: None,
        };

        match variant {
            ClientVariant::Standard => {
                let namespaces = client
                    .list(&KubeResource::Namespaces)
                    .await
                    .map_err(|e| tag(variant, &report.cluster_id, "list namespaces", e))?;
                debug!(cluster_id = %report.cluster_id, namespaces = namespaces.len(), "listed namespaces");
                report.namespaces = Some(namespaces.len());
            }
            ClientVariant::Elevated => {
                report.probe_object = self.run_probe(client, &report.cluster_id).await?;
                report.probe = Some(self.probe.to_string());
            }
        }

        info!(%variant, cluster_id = %report.cluster_id, "client validated");
        Ok(report)
    }

    async fn run_probe(&self, client: &KubeClient<'_>, cluster_id: &str) -> Result<Option<String>> {
        let variant = client.variant();
        let what = self.probe.to_string();
        let objects = client
            .list(&self.probe.resource())
            .await
            .map_err(|e| tag(variant, cluster_id, &what, e))?;

        match &self.probe {
            ElevatedProbe::Pods { namespace } => {
                debug!(%namespace, pods = objects.len(), "elevated probe succeeded");
                Ok(None)
            }
            ElevatedProbe::ClusterDeployment { cluster_id: target } => {
                let found = objects
                    .iter()
                    .find(|o| o.namespace.as_deref().is_some_and(|ns| ns.contains(target.as_str())))
                    .ok_or_else(|| {
                        BrokerError::validation(
                            variant,
                            cluster_id,
                            format!("clusterdeployment for cluster '{target}' not found"),
                        )
                    })?;
                let path = format!(
                    "{}/{}",
                    found.namespace.as_deref().unwrap_or_default(),
                    found.name
                );
                debug!(clusterdeployment = %path, "elevated probe succeeded");
                Ok(Some(path))
            }
        }
    }
}

fn tag(variant: ClientVariant, cluster_id: &str, what: &str, err: BrokerError) -> BrokerError {
    match err {
        BrokerError::Cancelled => BrokerError::Cancelled,
        err => BrokerError::validation(variant, cluster_id, format!("{what}: {err}")),
    }
}
