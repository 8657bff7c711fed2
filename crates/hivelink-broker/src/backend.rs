//! Backend interfaces the broker calls through.
//!
//! The broker never speaks a wire protocol itself. It drives three traits:
//!
//! - [`ControlPlane`] opens an authenticated [`Session`] against an endpoint
//! - [`Session`] answers cluster queries and performs per-cluster logins
//! - [`KubeApi`] lists resources on one logged-in cluster
//!
//! [`crate::http::OcmControlPlane`] implements them over HTTP and
//! [`crate::fake::FakeControlPlane`] implements them in memory.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use hivelink_config::Endpoint;
use serde::{Deserialize, Serialize};

use crate::elevation::ElevationRequest;
use crate::error::Result;

/// Boxed future returned by the backend traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Lifecycle state of a cluster as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterState {
    /// Waiting for prerequisites.
    Waiting,
    /// Accepted, not yet installing.
    Pending,
    /// Validating the install request.
    Validating,
    /// Installing.
    Installing,
    /// Installed and serving.
    Ready,
    /// Install or operation failed.
    Error,
    /// Hibernating.
    Hibernating,
    /// Powering down into hibernation.
    PoweringDown,
    /// Resuming from hibernation.
    Resuming,
    /// Being deleted.
    Uninstalling,
    /// A state this tool does not know.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ClusterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Validating => "validating",
            Self::Installing => "installing",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Hibernating => "hibernating",
            Self::PoweringDown => "powering_down",
            Self::Resuming => "resuming",
            Self::Uninstalling => "uninstalling",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A cluster as known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterRecord {
    internal_id: String,
    external_id: Option<String>,
    display_name: String,
    state: ClusterState,
    api_url: Option<String>,
}

impl ClusterRecord {
    /// Creates a record from control-plane data.
    ///
    /// Backends call this when decoding query results; callers obtain
    /// records through [`crate::ClusterLocator`].
    #[must_use]
    pub fn new(
        internal_id: impl Into<String>,
        display_name: impl Into<String>,
        state: ClusterState,
    ) -> Self {
        Self {
            internal_id: internal_id.into(),
            external_id: None,
            display_name: display_name.into(),
            state,
            api_url: None,
        }
    }

    /// Sets the external ID.
    #[must_use]
    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    /// Sets the Kubernetes API URL.
    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Internal (control-plane) ID.
    #[must_use]
    pub fn internal_id(&self) -> &str {
        &self.internal_id
    }

    /// External ID, if assigned.
    #[must_use]
    pub fn external_id(&self) -> Option<&str> {
        self.external_id.as_deref()
    }

    /// Display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> &ClusterState {
        &self.state
    }

    /// Kubernetes API URL, if known.
    #[must_use]
    pub fn api_url(&self) -> Option<&str> {
        self.api_url.as_deref()
    }
}

impl fmt::Display for ClusterRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}', '{}'", self.internal_id, self.display_name)
    }
}

/// The provisioning shard that manages a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionShard {
    /// Shard ID.
    pub id: String,
    /// API URL of the Hive cluster behind the shard.
    pub hive_api_url: String,
}

/// A structured cluster query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterSearch {
    /// Exact internal ID.
    InternalId(String),
    /// Exact external ID.
    ExternalId(String),
    /// Substring of the display name.
    DisplayNameContains(String),
    /// Exact Kubernetes API URL.
    ApiUrl(String),
}

impl ClusterSearch {
    /// Renders the query in the control plane's search language.
    ///
    /// No lifecycle-state filter is added, so clusters in every state match.
    #[must_use]
    pub fn to_search_string(&self) -> String {
        match self {
            Self::InternalId(id) => format!("(id = '{}')", escape(id)),
            Self::ExternalId(id) => format!("(external_id = '{}')", escape(id)),
            Self::DisplayNameContains(name) => {
                format!("(display_name like '%{}%')", escape(&escape_like(name)))
            }
            Self::ApiUrl(url) => format!("(api.url = '{}')", escape(url)),
        }
    }

    /// Returns true if a record satisfies the query.
    #[must_use]
    pub fn matches(&self, cluster: &ClusterRecord) -> bool {
        match self {
            Self::InternalId(id) => cluster.internal_id() == id,
            Self::ExternalId(id) => cluster.external_id() == Some(id.as_str()),
            Self::DisplayNameContains(name) => cluster.display_name().contains(name.as_str()),
            Self::ApiUrl(url) => cluster
                .api_url()
                .is_some_and(|api| api.trim_end_matches('/') == url.trim_end_matches('/')),
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\'', "''")
}

/// Makes `%` and `_` match literally inside a `like` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Kubernetes resources the broker reads.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KubeResource {
    /// Cluster-scoped `ClusterOperator` objects.
    ClusterOperators,
    /// Namespaces.
    Namespaces,
    /// Pods in one namespace.
    Pods {
        /// Namespace to list.
        namespace: String,
    },
    /// Hive `ClusterDeployment` objects across namespaces.
    ClusterDeployments,
}

impl KubeResource {
    /// Returns the API path for a list call.
    #[must_use]
    pub fn path(&self) -> String {
        match self {
            Self::ClusterOperators => "/apis/config.openshift.io/v1/clusteroperators".to_string(),
            Self::Namespaces => "/api/v1/namespaces".to_string(),
            Self::Pods { namespace } => format!("/api/v1/namespaces/{namespace}/pods"),
            Self::ClusterDeployments => "/apis/hive.openshift.io/v1/clusterdeployments".to_string(),
        }
    }
}

impl fmt::Display for KubeResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClusterOperators => write!(f, "clusteroperators"),
            Self::Namespaces => write!(f, "namespaces"),
            Self::Pods { namespace } => write!(f, "pods in '{namespace}'"),
            Self::ClusterDeployments => write!(f, "clusterdeployments"),
        }
    }
}

/// A status condition on a Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition type, e.g. `Available`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Condition status, `True`, `False` or `Unknown`.
    pub status: String,
}

/// The parts of a listed Kubernetes object the broker inspects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KubeObject {
    /// Object name.
    pub name: String,
    /// Object namespace, for namespaced kinds.
    pub namespace: Option<String>,
    /// Status conditions, if the kind has any.
    pub conditions: Vec<Condition>,
}

impl KubeObject {
    /// Creates a cluster-scoped object.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            conditions: Vec::new(),
        }
    }

    /// Sets the namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Adds a condition.
    #[must_use]
    pub fn with_condition(mut self, kind: impl Into<String>, status: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            kind: kind.into(),
            status: status.into(),
        });
        self
    }

    /// Decodes an item of a Kubernetes list response.
    ///
    /// Returns `None` if the item has no `metadata.name`.
    #[must_use]
    pub fn from_json(item: &serde_json::Value) -> Option<Self> {
        let metadata = item.get("metadata")?;
        let name = metadata.get("name")?.as_str()?.to_string();
        let namespace = metadata
            .get("namespace")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let conditions = item
            .pointer("/status/conditions")
            .cloned()
            .and_then(|c| serde_json::from_value(c).ok())
            .unwrap_or_default();
        Some(Self {
            name,
            namespace,
            conditions,
        })
    }

    /// Status of a condition by type, or an empty string if absent.
    #[must_use]
    pub fn condition(&self, kind: &str) -> &str {
        self.conditions
            .iter()
            .find(|c| c.kind == kind)
            .map_or("", |c| c.status.as_str())
    }
}

/// Opens authenticated sessions against control-plane endpoints.
pub trait ControlPlane: Send + Sync {
    /// Opens a session, exchanging the endpoint's credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns `Authentication` if the token exchange fails and
    /// `Unreachable` if the endpoint cannot be reached. No session exists
    /// after an error.
    fn open<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Box<dyn Session>>>;
}

/// An open, authenticated control-plane session.
pub trait Session: Send + Sync {
    /// Searches clusters in any lifecycle state.
    fn search_clusters<'a>(
        &'a self,
        search: &'a ClusterSearch,
    ) -> BoxFuture<'a, Result<Vec<ClusterRecord>>>;

    /// Returns the provisioning shard of a cluster, if it has one.
    fn provision_shard<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProvisionShard>>>;

    /// Logs into a cluster, optionally under an elevated identity.
    ///
    /// # Errors
    ///
    /// Returns `Login` if credential exchange fails and `Unreachable` on
    /// transport errors.
    fn login<'a>(
        &'a self,
        cluster: &'a ClusterRecord,
        elevation: Option<&'a ElevationRequest>,
    ) -> BoxFuture<'a, Result<Box<dyn KubeApi>>>;

    /// Releases the session. Called exactly once by [`crate::Connection`].
    fn close(&mut self);
}

/// List access to one logged-in cluster.
pub trait KubeApi: Send + Sync {
    /// Lists objects of a resource.
    fn list<'a>(&'a self, resource: &'a KubeResource) -> BoxFuture<'a, Result<Vec<KubeObject>>>;
}
