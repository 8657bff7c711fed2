//! End-to-end fixtures for hivelink.
//!
//! The tests under `tests/` drive a whole hive-login run against
//! [`FakeControlPlane`] topologies built here:
//! - a production environment holding the target cluster and, optionally,
//!   its Hive
//! - a staging environment holding the Hive for cross-environment runs

use std::io;
use std::path::{Path, PathBuf};

use hivelink_broker::{
    CheckId, CheckOptions, ClusterRecord, ClusterState, FakeControlPlane, KubeObject,
    KubeResource, OperatorStatus, Progress,
};
use hivelink_config::{Endpoint, Environment, Settings};

/// Production control plane.
pub const PROD_URL: &str = "https://api.openshift.com";
/// Staging control plane.
pub const STAGE_URL: &str = "https://api.stage.openshift.com";
/// Integration control plane.
pub const INT_URL: &str = "https://api.integration.openshift.com";

/// Internal ID of the target cluster.
pub const TARGET_ID: &str = "261kalm3uob0vegg1c7h9o7r5k9t64ji";
/// External ID of the target cluster.
pub const TARGET_EXTERNAL_ID: &str = "c1f562af-fb22-42c5-aa07-6848e1eeee9c";
/// Display name of the target cluster.
pub const TARGET_NAME: &str = "hs-mc-773jpgko0";

/// Internal ID of the Hive.
pub const HIVE_ID: &str = "1hive0000000000000000000000000aa";
/// API URL of the Hive.
pub const HIVE_API: &str = "https://api.hive-stage-01.n1k1.p1.openshiftapps.com:6443";

fn target() -> ClusterRecord {
    ClusterRecord::new(TARGET_ID, TARGET_NAME, ClusterState::Ready)
        .with_external_id(TARGET_EXTERNAL_ID)
}

/// The Hive cluster record, for serving it from additional environments.
#[must_use]
pub fn hive_cluster() -> ClusterRecord {
    ClusterRecord::new(HIVE_ID, "hive-stage-01", ClusterState::Ready).with_api_url(HIVE_API)
}

/// A healthy topology with the Hive served from `hive_url`.
///
/// The Hive holds a ClusterDeployment for the target and the target has
/// pods in its monitoring namespace.
#[must_use]
pub fn topology(hive_url: &str) -> FakeControlPlane {
    FakeControlPlane::new()
        .with_cluster(PROD_URL, target())
        .with_cluster(hive_url, hive_cluster())
        .with_shard(TARGET_ID, "shard-stage-01", HIVE_API)
        .with_healthy_operators(TARGET_ID)
        .with_healthy_operators(HIVE_ID)
        .with_objects(
            TARGET_ID,
            KubeResource::Pods {
                namespace: "openshift-monitoring".into(),
            },
            vec![KubeObject::named("prometheus-k8s-0").in_namespace("openshift-monitoring")],
        )
        .with_objects(
            HIVE_ID,
            KubeResource::ClusterDeployments,
            vec![
                KubeObject::named("unrelated").in_namespace("uhc-production-2aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
                KubeObject::named(TARGET_NAME).in_namespace(format!("uhc-production-{TARGET_ID}")),
            ],
        )
}

/// Target and Hive in the production environment.
#[must_use]
pub fn same_environment() -> FakeControlPlane {
    topology(PROD_URL)
}

/// Target in production, Hive in staging.
#[must_use]
pub fn cross_environment() -> FakeControlPlane {
    topology(STAGE_URL)
}

/// Settings as a user with production credentials in the environment has them.
#[must_use]
pub fn env_settings() -> Settings {
    Settings::new().with_environment(Environment::from_pairs([
        ("OCM_URL", PROD_URL),
        ("OCM_TOKEN", "prod-token"),
    ]))
}

/// Run options for a cluster identifier.
#[must_use]
pub fn options(cluster: &str) -> CheckOptions {
    CheckOptions {
        cluster: cluster.to_string(),
        ..CheckOptions::default()
    }
}

/// Writes an endpoint document for `url` into `dir`.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_endpoint_file(dir: &Path, url: &str) -> io::Result<PathBuf> {
    let endpoint = Endpoint::new(url).with_access_token("stage-token");
    let content = serde_json::to_string_pretty(&endpoint).map_err(io::Error::other)?;
    let path = dir.join("hive-ocm.json");
    std::fs::write(&path, content)?;
    Ok(path)
}

/// Progress that keeps every line.
#[derive(Debug, Default)]
pub struct Transcript {
    /// Lines in order.
    pub lines: Vec<String>,
}

impl Transcript {
    /// True if any line contains `needle`.
    #[must_use]
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

impl Progress for Transcript {
    fn step(&mut self, message: &str) {
        self.lines.push(message.to_string());
    }

    fn divider(&mut self) {}

    fn operators(&mut self, operators: &[OperatorStatus]) {
        self.lines.push(format!("{} operators", operators.len()));
    }

    fn passed(&mut self, check: &CheckId) {
        self.lines.push(format!("PASS {check}"));
    }

    fn skipped(&mut self, check: &CheckId, why: &str) {
        self.lines.push(format!("SKIP {check}: {why}"));
    }
}
