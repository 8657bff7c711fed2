//! HTTP control-plane backend.
//!
//! Talks to the clusters management API for cluster records and shards, and
//! to the backplane API for per-cluster logins. Kubernetes list calls go
//! through the backplane proxy returned by a login.
//!
//! Each session logs in through the backplane of its own control plane: a
//! URL pinned for that control plane, or else the one its environment record
//! names.

use std::collections::HashMap;
use std::time::Duration;

use hivelink_config::{ConfigError, Credentials, Endpoint};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::backend::{
    BoxFuture, ClusterRecord, ClusterSearch, ClusterState, ControlPlane, KubeApi, KubeObject,
    KubeResource, ProvisionShard, Session,
};
use crate::elevation::ElevationRequest;
use crate::error::{BrokerError, Result};

/// SSO token endpoint used for refresh and client-credentials grants.
pub const DEFAULT_TOKEN_URL: &str =
    "https://sso.redhat.com/auth/realms/redhat-external/protocol/openid-connect/token";

/// Client ID sent with refresh grants when the endpoint names none.
pub const DEFAULT_CLIENT_ID: &str = "cloud-services";

/// User the backplane impersonates for elevated clients.
pub const ELEVATED_USER: &str = "backplane-cluster-admin";

const CLUSTERS_PATH: &str = "/api/clusters_mgmt/v1/clusters";
const ENVIRONMENT_PATH: &str = "/api/clusters_mgmt/v1/environment";
const SEARCH_PAGE_SIZE: &str = "100";

/// A [`ControlPlane`] over HTTP.
#[derive(Debug, Clone)]
pub struct OcmControlPlane {
    http: Client,
    token_url: String,
    backplane_urls: HashMap<String, String>,
}

impl OcmControlPlane {
    /// Creates a backend with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("hivelink/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ConfigError::invalid_config(format!("http client: {e}")))?;
        Ok(Self {
            http,
            token_url: DEFAULT_TOKEN_URL.to_string(),
            backplane_urls: HashMap::new(),
        })
    }

    /// Sets the token endpoint.
    #[must_use]
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Pins the backplane API URL for sessions against the control plane at
    /// `api_url`. A `None` or blank URL leaves the lookup to the environment
    /// record.
    #[must_use]
    pub fn with_backplane_url(mut self, api_url: &str, backplane_url: Option<String>) -> Self {
        if let Some(url) = backplane_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) {
            self.backplane_urls
                .insert(trim_url(api_url), url.trim_end_matches('/').to_string());
        }
        self
    }

    /// The backplane URL pinned for the control plane at `api_url`.
    #[must_use]
    pub fn backplane_for(&self, api_url: &str) -> Option<&str> {
        self.backplane_urls.get(&trim_url(api_url)).map(String::as_str)
    }

    fn session(&self, endpoint: &Endpoint, token: String) -> OcmSession {
        let api_url = trim_url(endpoint.url_or_default());
        OcmSession {
            http: self.http.clone(),
            backplane_url: OnceCell::new_with(self.backplane_for(&api_url).map(str::to_string)),
            api_url,
            token,
        }
    }

    async fn access_token(&self, endpoint: &Endpoint) -> Result<String> {
        let url = endpoint.url_or_default();
        let form: Vec<(&str, &str)> = match endpoint.credentials() {
            Some(Credentials::Bearer {
                access_token: Some(token),
                ..
            }) => return Ok(token.to_string()),
            Some(Credentials::Bearer {
                refresh_token: Some(refresh),
                ..
            }) => vec![
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh),
                ("client_id", endpoint.client_id().unwrap_or(DEFAULT_CLIENT_ID)),
            ],
            Some(Credentials::ClientCredentials {
                client_id,
                client_secret,
            }) => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret),
            ],
            Some(Credentials::Bearer { .. }) | None => {
                return Err(BrokerError::authentication(url, "no usable credentials"));
            }
        };

        debug!(%url, token_url = %self.token_url, grant = form[0].1, "exchanging token");
        let response = self
            .http
            .post(&self.token_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| send_error(&self.token_url, &e))?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BrokerError::authentication(url, format!("{status}: {body}")));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| BrokerError::authentication(url, format!("bad token response: {e}")))?;
        Ok(token.access_token)
    }
}

impl ControlPlane for OcmControlPlane {
    fn open<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<Box<dyn Session>>> {
        Box::pin(async move {
            let token = self.access_token(endpoint).await?;
            Ok(Box::new(self.session(endpoint, token)) as Box<dyn Session>)
        })
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct ClusterList {
    #[serde(default)]
    items: Vec<ClusterItem>,
}

#[derive(Deserialize)]
struct ClusterItem {
    id: String,
    #[serde(default)]
    external_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default = "unknown_state")]
    state: ClusterState,
    #[serde(default)]
    api: Option<ApiItem>,
}

#[derive(Deserialize)]
struct ApiItem {
    #[serde(default)]
    url: Option<String>,
}

fn unknown_state() -> ClusterState {
    ClusterState::Unknown
}

impl From<ClusterItem> for ClusterRecord {
    fn from(item: ClusterItem) -> Self {
        let name = item
            .display_name
            .filter(|n| !n.is_empty())
            .or(item.name)
            .unwrap_or_default();
        let mut record = ClusterRecord::new(item.id, name, item.state);
        if let Some(external_id) = item.external_id.filter(|id| !id.is_empty()) {
            record = record.with_external_id(external_id);
        }
        if let Some(url) = item.api.and_then(|api| api.url) {
            record = record.with_api_url(url);
        }
        record
    }
}

#[derive(Deserialize)]
struct ShardItem {
    id: String,
    #[serde(default)]
    hive_config: Option<HiveConfigItem>,
}

#[derive(Deserialize)]
struct HiveConfigItem {
    server: String,
}

#[derive(Deserialize)]
struct EnvironmentItem {
    #[serde(default)]
    backplane_url: Option<String>,
}

#[derive(Deserialize)]
struct LoginResponse {
    proxy_uri: String,
}

struct OcmSession {
    http: Client,
    api_url: String,
    backplane_url: OnceCell<String>,
    token: String,
}

impl OcmSession {
    fn get(&self, path: &str) -> RequestBuilder {
        self.http
            .get(format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
    }

    async fn backplane(&self) -> Result<&str> {
        self.backplane_url
            .get_or_try_init(|| self.read_backplane_url())
            .await
            .map(String::as_str)
    }

    async fn read_backplane_url(&self) -> Result<String> {
        let response = self
            .get(ENVIRONMENT_PATH)
            .send()
            .await
            .map_err(|e| send_error(&self.api_url, &e))?;
        let environment: EnvironmentItem = read_json(&self.api_url, response).await?;
        let url = environment
            .backplane_url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| {
                ConfigError::invalid_config(format!("no backplane url configured for '{}'", self.api_url))
            })?;
        debug!(api_url = %self.api_url, backplane_url = %url, "read backplane url from environment");
        Ok(url.trim_end_matches('/').to_string())
    }
}

impl Session for OcmSession {
    fn search_clusters<'a>(
        &'a self,
        search: &'a ClusterSearch,
    ) -> BoxFuture<'a, Result<Vec<ClusterRecord>>> {
        Box::pin(async move {
            let query = search.to_search_string();
            let response = self
                .get(CLUSTERS_PATH)
                .query(&[("search", query.as_str()), ("size", SEARCH_PAGE_SIZE)])
                .send()
                .await
                .map_err(|e| send_error(&self.api_url, &e))?;
            let list: ClusterList = read_json(&self.api_url, response).await?;
            Ok(list.items.into_iter().map(ClusterRecord::from).collect())
        })
    }

    fn provision_shard<'a>(
        &'a self,
        cluster_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ProvisionShard>>> {
        Box::pin(async move {
            let response = self
                .get(&format!("{CLUSTERS_PATH}/{cluster_id}/provision_shard"))
                .send()
                .await
                .map_err(|e| send_error(&self.api_url, &e))?;
            if response.status() == StatusCode::NOT_FOUND {
                return Ok(None);
            }
            let shard: ShardItem = read_json(&self.api_url, response).await?;
            Ok(shard.hive_config.map(|hive| ProvisionShard {
                id: shard.id,
                hive_api_url: hive.server,
            }))
        })
    }

    fn login<'a>(
        &'a self,
        cluster: &'a ClusterRecord,
        elevation: Option<&'a ElevationRequest>,
    ) -> BoxFuture<'a, Result<Box<dyn KubeApi>>> {
        Box::pin(async move {
            let cluster_id = cluster.internal_id();
            let backplane = self.backplane().await?;

            let response = self
                .http
                .post(format!("{backplane}/backplane/login/{cluster_id}"))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| send_error(cluster_id, &e))?;
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(BrokerError::login(cluster_id, format!("{status}: {body}")));
            }
            let login: LoginResponse = response
                .json()
                .await
                .map_err(|e| BrokerError::login(cluster_id, format!("bad login response: {e}")))?;

            Ok(Box::new(BackplaneKubeApi {
                http: self.http.clone(),
                cluster_id: cluster_id.to_string(),
                server: proxy_server(backplane, &login.proxy_uri),
                token: self.token.clone(),
                reason: elevation.map(|e| e.reason().to_string()),
            }) as Box<dyn KubeApi>)
        })
    }

    fn close(&mut self) {
        self.token.clear();
        debug!(url = %self.api_url, "http session closed");
    }
}

struct BackplaneKubeApi {
    http: Client,
    cluster_id: String,
    server: String,
    token: String,
    reason: Option<String>,
}

impl KubeApi for BackplaneKubeApi {
    fn list<'a>(&'a self, resource: &'a KubeResource) -> BoxFuture<'a, Result<Vec<KubeObject>>> {
        Box::pin(async move {
            let mut request = self
                .http
                .get(format!("{}{}", self.server, resource.path()))
                .bearer_auth(&self.token);
            if let Some(reason) = &self.reason {
                request = request
                    .header("Impersonate-User", ELEVATED_USER)
                    .header("Impersonate-Extra-Reason", reason);
            }
            let response = request
                .send()
                .await
                .map_err(|e| send_error(&self.cluster_id, &e))?;
            let list: serde_json::Value = read_json(&self.cluster_id, response).await?;

            let items = list
                .get("items")
                .and_then(serde_json::Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let objects: Vec<KubeObject> = items.iter().filter_map(KubeObject::from_json).collect();
            if objects.len() < items.len() {
                warn!(
                    cluster_id = %self.cluster_id,
                    %resource,
                    skipped = items.len() - objects.len(),
                    "skipped list items without a name"
                );
            }
            Ok(objects)
        })
    }
}

fn trim_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Resolves a login's proxy URI against the backplane URL.
fn proxy_server(backplane: &str, proxy_uri: &str) -> String {
    let proxy = proxy_uri.trim_end_matches('/');
    if proxy.starts_with("http://") || proxy.starts_with("https://") {
        proxy.to_string()
    } else {
        format!("{backplane}/{}", proxy.trim_start_matches('/'))
    }
}

fn send_error(target: &str, err: &reqwest::Error) -> BrokerError {
    if err.is_connect() || err.is_timeout() {
        BrokerError::unreachable(target, err.to_string())
    } else {
        BrokerError::api(target, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(target: &str, response: Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(BrokerError::api(target, Some(status.as_u16()), body));
    }
    response
        .json()
        .await
        .map_err(|e| BrokerError::api(target, Some(status.as_u16()), format!("bad response body: {e}")))
}
