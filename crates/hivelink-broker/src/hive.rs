//! Hive (management cluster) discovery.
//!
//! The Hive connection source is chosen from an ordered candidate list:
//!
//! 1. an explicit endpoint document ([`HiveSource::ConfigFile`])
//! 2. an explicit control-plane URL applied to the target's endpoint
//!    ([`HiveSource::UrlOverride`])
//! 3. the target's own connection ([`HiveSource::ReuseTarget`])
//!
//! The first candidate present wins. The target's provisioning shard is then
//! read through the target connection, and the Hive cluster is looked up by
//! the shard's API URL through the chosen connection.

use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::backend::{ClusterRecord, ClusterSearch, ProvisionShard};
use crate::connection::{BuildMode, Connection, ConnectionBuilder};
use crate::error::{BrokerError, Result};

/// Where the Hive connection comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HiveSource {
    /// A separate endpoint document.
    ConfigFile(PathBuf),
    /// The target's endpoint with a different URL.
    UrlOverride(String),
    /// The target's connection, unchanged.
    ReuseTarget,
}

impl HiveSource {
    /// All applicable sources, highest precedence first.
    ///
    /// Blank values are ignored. The list always ends with
    /// [`HiveSource::ReuseTarget`].
    #[must_use]
    pub fn candidates(config_file: Option<&Path>, url: Option<&str>) -> Vec<Self> {
        let mut candidates = Vec::with_capacity(3);
        if let Some(path) = config_file.filter(|p| !p.as_os_str().is_empty()) {
            candidates.push(Self::ConfigFile(path.to_path_buf()));
        }
        if let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) {
            candidates.push(Self::UrlOverride(url.to_string()));
        }
        candidates.push(Self::ReuseTarget);
        candidates
    }

    /// The highest-precedence applicable source.
    #[must_use]
    pub fn select(config_file: Option<&Path>, url: Option<&str>) -> Self {
        Self::candidates(config_file, url)
            .into_iter()
            .next()
            .unwrap_or(Self::ReuseTarget)
    }
}

impl fmt::Display for HiveSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigFile(path) => write!(f, "config file '{}'", path.display()),
            Self::UrlOverride(url) => write!(f, "url override '{url}'"),
            Self::ReuseTarget => f.write_str("target connection"),
        }
    }
}

/// The Hive connection, either borrowed from the target or owned.
#[derive(Debug)]
pub enum HiveConnection<'t> {
    /// The target's connection.
    Shared(&'t Connection),
    /// A connection opened only for the Hive.
    Dedicated(Connection),
}

impl HiveConnection<'_> {
    /// True if the target's connection is reused.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        matches!(self, Self::Shared(_))
    }

    /// Closes a dedicated connection. A shared one is left to its owner.
    pub fn close(self) {
        if let Self::Dedicated(connection) = self {
            connection.close();
        }
    }
}

impl Deref for HiveConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Self::Shared(connection) => *connection,
            Self::Dedicated(connection) => connection,
        }
    }
}

/// A target cluster paired with its Hive.
#[derive(Debug)]
pub struct HiveLink<'t> {
    target: ClusterRecord,
    hive: ClusterRecord,
    shard: ProvisionShard,
    source: HiveSource,
    connection: HiveConnection<'t>,
}

impl HiveLink<'_> {
    /// The target cluster.
    #[must_use]
    pub fn target(&self) -> &ClusterRecord {
        &self.target
    }

    /// The Hive cluster.
    #[must_use]
    pub fn hive(&self) -> &ClusterRecord {
        &self.hive
    }

    /// The target's provisioning shard.
    #[must_use]
    pub fn shard(&self) -> &ProvisionShard {
        &self.shard
    }

    /// Where the Hive connection came from.
    #[must_use]
    pub fn source(&self) -> &HiveSource {
        &self.source
    }

    /// The connection to the Hive's control plane.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// True if the target's connection is reused.
    #[must_use]
    pub fn is_shared(&self) -> bool {
        self.connection.is_shared()
    }

    /// Releases the link, closing a dedicated Hive connection.
    pub fn close(self) {
        self.connection.close();
    }
}

/// Discovers the Hive for a target cluster.
#[derive(Debug, Clone, Copy)]
pub struct HiveDiscovery<'a> {
    builder: ConnectionBuilder<'a>,
}

impl<'a> HiveDiscovery<'a> {
    /// Creates a discovery that opens dedicated connections with `builder`.
    #[must_use]
    pub fn new(builder: ConnectionBuilder<'a>) -> Self {
        Self { builder }
    }

    /// Resolves the Hive link for `target`.
    ///
    /// The target's endpoint is never modified. A dedicated connection
    /// opened here is released if any later lookup fails.
    ///
    /// # Errors
    ///
    /// - configuration, authentication or network errors from opening a
    ///   dedicated connection
    /// - `HiveNotFound` if the target has no shard or no cluster serves the
    ///   shard's API URL
    pub async fn locate<'t>(
        &self,
        target: &ClusterRecord,
        target_connection: &'t Connection,
        config_file: Option<&Path>,
        url: Option<&str>,
    ) -> Result<HiveLink<'t>> {
        let source = HiveSource::select(config_file, url);
        debug!(cluster_id = target.internal_id(), %source, "selected hive connection source");

        let connection = self.connect(&source, target_connection).await?;
        let (shard, hive) = Self::find_hive(target, target_connection, &connection).await?;

        info!(
            cluster_id = target.internal_id(),
            hive_id = hive.internal_id(),
            shard = %shard.id,
            %source,
            "located hive"
        );
        Ok(HiveLink {
            target: target.clone(),
            hive,
            shard,
            source,
            connection,
        })
    }

    async fn connect<'t>(
        &self,
        source: &HiveSource,
        target_connection: &'t Connection,
    ) -> Result<HiveConnection<'t>> {
        let mode = match source {
            HiveSource::ReuseTarget => return Ok(HiveConnection::Shared(target_connection)),
            HiveSource::ConfigFile(path) => BuildMode::FromFile(path),
            HiveSource::UrlOverride(url) => BuildMode::FromConfigWithOverride {
                config: Some(target_connection.endpoint()),
                url,
            },
        };
        Ok(HiveConnection::Dedicated(self.builder.build(mode).await?))
    }

    async fn find_hive(
        target: &ClusterRecord,
        target_connection: &Connection,
        hive_connection: &Connection,
    ) -> Result<(ProvisionShard, ClusterRecord)> {
        let cluster_id = target.internal_id();
        let shard = target_connection
            .session()
            .provision_shard(cluster_id)
            .await?
            .ok_or_else(|| BrokerError::hive_not_found(cluster_id, "no provision shard"))?;
        debug!(cluster_id, shard = %shard.id, hive_api_url = %shard.hive_api_url, "read provision shard");

        let search = ClusterSearch::ApiUrl(shard.hive_api_url.clone());
        let mut hives = hive_connection.session().search_clusters(&search).await?;
        match hives.len() {
            1 => Ok((shard, hives.remove(0))),
            0 => Err(BrokerError::hive_not_found(
                cluster_id,
                format!(
                    "no cluster with api url '{}' at '{}'",
                    shard.hive_api_url,
                    hive_connection.url()
                ),
            )),
            count => Err(BrokerError::hive_not_found(
                cluster_id,
                format!("{count} clusters share api url '{}'", shard.hive_api_url),
            )),
        }
    }
}
