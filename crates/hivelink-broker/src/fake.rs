//! In-memory control plane for tests.
//!
//! [`FakeControlPlane`] serves clusters per control-plane URL, records every
//! call, and can be told to fail or stall at any step. Clones share state, so
//! a test keeps one handle for inspection while the broker uses another.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use hivelink_config::Endpoint;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::backend::{
    BoxFuture, ClusterRecord, ClusterSearch, ClusterState, ControlPlane, KubeApi, KubeObject,
    KubeResource, ProvisionShard, Session,
};
use crate::elevation::ElevationRequest;
use crate::error::{BrokerError, Result};

/// A recorded login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginCall {
    /// Sequence number of the session that logged in, starting at 0.
    pub session: usize,
    /// Internal ID of the cluster.
    pub cluster_id: String,
    /// Elevation reason, for elevated logins.
    pub reason: Option<String>,
}

/// A recorded list call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    /// Internal ID of the cluster.
    pub cluster_id: String,
    /// Resource listed.
    pub resource: KubeResource,
    /// True if made through an elevated client.
    pub elevated: bool,
}

#[derive(Debug, Default)]
struct FakeState {
    clusters: Vec<(String, ClusterRecord)>,
    shards: HashMap<String, ProvisionShard>,
    objects: HashMap<(String, KubeResource), Vec<KubeObject>>,
    failing_opens: HashSet<String>,
    open_limits: HashMap<String, usize>,
    failing_searches: HashSet<String>,
    failing_logins: HashSet<String>,
    unreachable: HashSet<String>,
    stalled_logins: HashSet<String>,
    failing_lists: HashSet<(String, KubeResource)>,
    opened: Vec<String>,
    closed: Vec<usize>,
    searches: Vec<ClusterSearch>,
    logins: Vec<LoginCall>,
    lists: Vec<ListCall>,
}

/// An in-memory [`ControlPlane`].
#[derive(Debug, Clone, Default)]
pub struct FakeControlPlane {
    state: Arc<Mutex<FakeState>>,
}

impl FakeControlPlane {
    /// Creates an empty fake.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a cluster served by the control plane at `url`.
    #[must_use]
    pub fn with_cluster(self, url: impl Into<String>, cluster: ClusterRecord) -> Self {
        self.state.lock().clusters.push((url.into(), cluster));
        self
    }

    /// Registers the provisioning shard of a cluster.
    #[must_use]
    pub fn with_shard(
        self,
        cluster_id: impl Into<String>,
        shard_id: impl Into<String>,
        hive_api_url: impl Into<String>,
    ) -> Self {
        let shard = ProvisionShard {
            id: shard_id.into(),
            hive_api_url: hive_api_url.into(),
        };
        self.state.lock().shards.insert(cluster_id.into(), shard);
        self
    }

    /// Sets the objects returned when listing `resource` on a cluster.
    #[must_use]
    pub fn with_objects(
        self,
        cluster_id: impl Into<String>,
        resource: KubeResource,
        objects: Vec<KubeObject>,
    ) -> Self {
        self.state
            .lock()
            .objects
            .insert((cluster_id.into(), resource), objects);
        self
    }

    /// Gives a cluster a few available, settled cluster operators.
    #[must_use]
    pub fn with_healthy_operators(self, cluster_id: impl Into<String>) -> Self {
        let operators = ["authentication", "console", "dns", "etcd", "ingress"]
            .into_iter()
            .map(|name| {
                KubeObject::named(name)
                    .with_condition("Available", "True")
                    .with_condition("Progressing", "False")
                    .with_condition("Degraded", "False")
            })
            .collect();
        self.with_objects(cluster_id, KubeResource::ClusterOperators, operators)
    }

    /// Makes opening a session against `url` fail authentication.
    #[must_use]
    pub fn fail_open(self, url: impl Into<String>) -> Self {
        self.state.lock().failing_opens.insert(url.into());
        self
    }

    /// Lets `successes` sessions open against `url`, then fails the rest.
    #[must_use]
    pub fn fail_open_after(self, url: impl Into<String>, successes: usize) -> Self {
        self.state.lock().open_limits.insert(url.into(), successes);
        self
    }

    /// Makes cluster searches against `url` fail.
    #[must_use]
    pub fn fail_search(self, url: impl Into<String>) -> Self {
        self.state.lock().failing_searches.insert(url.into());
        self
    }

    /// Makes logins to a cluster fail credential exchange.
    #[must_use]
    pub fn fail_login(self, cluster_id: impl Into<String>) -> Self {
        self.state.lock().failing_logins.insert(cluster_id.into());
        self
    }

    /// Makes a cluster unreachable.
    #[must_use]
    pub fn unreachable(self, cluster_id: impl Into<String>) -> Self {
        self.state.lock().unreachable.insert(cluster_id.into());
        self
    }

    /// Makes logins to a cluster never complete.
    #[must_use]
    pub fn stall_login(self, cluster_id: impl Into<String>) -> Self {
        self.state.lock().stalled_logins.insert(cluster_id.into());
        self
    }

    /// Makes listing a resource on a cluster fail.
    #[must_use]
    pub fn fail_list(self, cluster_id: impl Into<String>, resource: KubeResource) -> Self {
        self.state
            .lock()
            .failing_lists
            .insert((cluster_id.into(), resource));
        self
    }

    /// Number of sessions opened.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.state.lock().opened.len()
    }

    /// Number of session closes, counting repeats.
    #[must_use]
    pub fn close_count(&self) -> usize {
        self.state.lock().closed.len()
    }

    /// True if every opened session was closed exactly once.
    #[must_use]
    pub fn all_closed(&self) -> bool {
        let state = self.state.lock();
        let mut closed = state.closed.clone();
        closed.sort_unstable();
        closed == (0..state.opened.len()).collect::<Vec<_>>()
    }

    /// URLs of opened sessions, in order.
    #[must_use]
    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    /// Recorded cluster searches.
    #[must_use]
    pub fn search_calls(&self) -> Vec<ClusterSearch> {
        self.state.lock().searches.clone()
    }

    /// Recorded logins.
    #[must_use]
    pub fn login_calls(&self) -> Vec<LoginCall> {
        self.state.lock().logins.clone()
    }

    /// Recorded list calls.
    #[must_use]
    pub fn list_calls(&self) -> Vec<ListCall> {
        self.state.lock().lists.clone()
    }

    /// Total number of backend calls made through sessions.
    #[must_use]
    pub fn network_calls(&self) -> usize {
        let state = self.state.lock();
        state.searches.len() + state.logins.len() + state.lists.len()
    }
}

impl ControlPlane for FakeControlPlane {
    fn open<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        let url = endpoint.url_or_default().to_string();
        let result = {
            let mut state = self.state.lock();
            let opened_here = state.opened.iter().filter(|u| **u == url).count();
            let over_limit = state
                .open_limits
                .get(&url)
                .is_some_and(|&limit| opened_here >= limit);
            if state.failing_opens.contains(&url) || over_limit {
                Err(BrokerError::authentication(&url, "invalid_grant"))
            } else {
                let number = state.opened.len();
                state.opened.push(url.clone());
                debug!(session = number, %url, "fake session opened");
                Ok(Box::new(FakeSession {
                    number,
                    url,
                    state: Arc::clone(&self.state),
                }) as Box<dyn Session>)
            }
        };
        Box::pin(std::future::ready(result))
    }
}

struct FakeSession {
    number: usize,
    url: String,
    state: Arc<Mutex<FakeState>>,
}

impl Session for FakeSession {
    fn search_clusters<'a>(
        &'a self,
        search: &'a ClusterSearch,
    ) -> BoxFuture<'a, Result<Vec<ClusterRecord>>> {
        let result = {
            let mut state = self.state.lock();
            state.searches.push(search.clone());
            if state.failing_searches.contains(&self.url) {
                Err(BrokerError::api(&self.url, Some(500), "internal server error"))
            } else {
                Ok(state
                    .clusters
                    .iter()
                    .filter(|(url, cluster)| *url == self.url && search.matches(cluster))
                    .map(|(_, cluster)| cluster.clone())
                    .collect())
            }
        };
        Box::pin(std::future::ready(result))
    }

    fn provision_shard<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProvisionShard>>> {
        let shard = self.state.lock().shards.get(cluster_id).cloned();
        Box::pin(std::future::ready(Ok(shard)))
    }

    fn login<'a>(
        &'a self,
        cluster: &'a ClusterRecord,
        elevation: Option<&'a ElevationRequest>,
    ) -> BoxFuture<'a, Result<Box<dyn KubeApi>>> {
        let cluster_id = cluster.internal_id().to_string();
        let mut state = self.state.lock();
        state.logins.push(LoginCall {
            session: self.number,
            cluster_id: cluster_id.clone(),
            reason: elevation.map(|e| e.reason().to_string()),
        });
        if state.stalled_logins.contains(&cluster_id) {
            return Box::pin(std::future::pending());
        }
        let result = if state.unreachable.contains(&cluster_id) {
            Err(BrokerError::unreachable(&cluster_id, "connection refused"))
        } else if state.failing_logins.contains(&cluster_id) {
            Err(BrokerError::login(&cluster_id, "credential exchange rejected"))
        } else {
            Ok(Box::new(FakeKubeApi {
                cluster_id,
                elevated: elevation.is_some(),
                state: Arc::clone(&self.state),
            }) as Box<dyn KubeApi>)
        };
        Box::pin(std::future::ready(result))
    }

    fn close(&mut self) {
        self.state.lock().closed.push(self.number);
    }
}

struct FakeKubeApi {
    cluster_id: String,
    elevated: bool,
    state: Arc<Mutex<FakeState>>,
}

fn is_privileged(resource: &KubeResource) -> bool {
    match resource {
        KubeResource::Pods { namespace } => namespace.starts_with("openshift-"),
        KubeResource::ClusterDeployments => true,
        KubeResource::ClusterOperators | KubeResource::Namespaces => false,
    }
}

impl KubeApi for FakeKubeApi {
    fn list<'a>(&'a self, resource: &'a KubeResource) -> BoxFuture<'a, Result<Vec<KubeObject>>> {
        let result = {
            let mut state = self.state.lock();
            state.lists.push(ListCall {
                cluster_id: self.cluster_id.clone(),
                resource: resource.clone(),
                elevated: self.elevated,
            });
            let key = (self.cluster_id.clone(), resource.clone());
            if state.failing_lists.contains(&key) {
                Err(BrokerError::api(&self.cluster_id, Some(500), "internal error"))
            } else if is_privileged(resource) && !self.elevated {
                Err(BrokerError::api(
                    &self.cluster_id,
                    Some(403),
                    format!("{resource} is forbidden"),
                ))
            } else {
                Ok(state.objects.get(&key).cloned().unwrap_or_default())
            }
        };
        Box::pin(std::future::ready(result))
    }
}

/// Builds a ready cluster with generated internal and external IDs.
#[must_use]
pub fn fake_cluster(display_name: &str) -> ClusterRecord {
    ClusterRecord::new(
        Uuid::new_v4().simple().to_string(),
        display_name,
        ClusterState::Ready,
    )
    .with_external_id(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ClusterIdentifierQuery;

    #[test]
    fn test_fake_cluster_ids_classify() {
        let cluster = fake_cluster("test");
        assert!(matches!(
            ClusterIdentifierQuery::classify(cluster.internal_id()),
            ClusterIdentifierQuery::InternalId(_)
        ));
        assert!(matches!(
            ClusterIdentifierQuery::classify(cluster.external_id().unwrap_or_default()),
            ClusterIdentifierQuery::ExternalId(_)
        ));
    }

    #[tokio::test]
    async fn test_sessions_are_scoped_by_url() {
        let fake = FakeControlPlane::new()
            .with_cluster("https://a", fake_cluster("alpha"))
            .with_cluster("https://b", fake_cluster("beta"));
        let endpoint = Endpoint::new("https://a").with_access_token("t");
        let session = fake.open(&endpoint).await.expect("open");

        let found = session
            .search_clusters(&ClusterSearch::DisplayNameContains(String::new()))
            .await
            .expect("search");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name(), "alpha");
    }

    #[tokio::test]
    async fn test_close_accounting() {
        let fake = FakeControlPlane::new();
        let endpoint = Endpoint::new("https://a").with_access_token("t");
        let mut first = fake.open(&endpoint).await.expect("open");
        let _second = fake.open(&endpoint).await.expect("open");

        first.close();
        assert_eq!(fake.open_count(), 2);
        assert_eq!(fake.close_count(), 1);
        assert!(!fake.all_closed());
    }

    #[tokio::test]
    async fn test_fail_open_after_limit() {
        let fake = FakeControlPlane::new().fail_open_after("https://a", 1);
        let endpoint = Endpoint::new("https://a").with_access_token("t");
        let other = Endpoint::new("https://b").with_access_token("t");

        assert!(fake.open(&endpoint).await.is_ok());
        assert!(matches!(
            fake.open(&endpoint).await,
            Err(BrokerError::Authentication { .. })
        ));
        assert!(fake.open(&other).await.is_ok());
        assert_eq!(fake.opened_urls(), vec!["https://a".to_string(), "https://b".to_string()]);
    }
}
