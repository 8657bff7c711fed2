//! The hive-login diagnostic run.
//!
//! A strictly sequential, fail-fast sequence: resolve the Hive URL source,
//! connect, locate the target, discover its Hive, then build and validate
//! each client variant in turn. Hive clients built through the default path
//! discover the Hive again from the resolved Hive URL alone. Every network call races one cancellation
//! token. Connections are owned by locals of [`HiveLoginCheck::run`], so
//! every exit path releases them.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use hivelink_config::{HIVE_URL_KEY, Settings, ValueSource};
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{BoxFuture, ClusterRecord, ControlPlane};
use crate::connection::{BuildMode, ConnectionBuilder};
use crate::error::{BrokerError, ErrorKind};
use crate::factory::{ClientFactory, ClientVariant, KubeClient};
use crate::hive::{HiveDiscovery, HiveSource};
use crate::locator::ClusterLocator;
use crate::validator::{ElevatedProbe, OperatorStatus, SessionValidator, ValidationReport};

/// Which cluster a check targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterRole {
    /// The managed cluster named by the user.
    Target,
    /// Its Hive.
    Hive,
}

/// Which connection a client is built through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// The default path: the target connection, or for the Hive a fresh
    /// discovery through the resolved Hive URL.
    Default,
    /// A connection passed explicitly.
    Explicit,
}

/// One client check of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CheckId {
    /// Cluster checked.
    pub role: ClusterRole,
    /// Client variant built.
    pub variant: ClientVariant,
    /// Connection used.
    pub connection: ConnectionKind,
}

impl CheckId {
    const fn new(role: ClusterRole, variant: ClientVariant, connection: ConnectionKind) -> Self {
        Self {
            role,
            variant,
            connection,
        }
    }
}

impl fmt::Display for CheckId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let role = match self.role {
            ClusterRole::Target => "target",
            ClusterRole::Hive => "hive",
        };
        let connection = match self.connection {
            ConnectionKind::Default => "default",
            ConnectionKind::Explicit => "explicit",
        };
        write!(f, "{} {role} client via {connection} connection", self.variant)
    }
}

/// The client checks, in run order.
pub const CHECKS: [CheckId; 8] = [
    CheckId::new(ClusterRole::Target, ClientVariant::Standard, ConnectionKind::Default),
    CheckId::new(ClusterRole::Hive, ClientVariant::Standard, ConnectionKind::Explicit),
    CheckId::new(ClusterRole::Hive, ClientVariant::Elevated, ConnectionKind::Explicit),
    CheckId::new(ClusterRole::Target, ClientVariant::Standard, ConnectionKind::Explicit),
    CheckId::new(ClusterRole::Target, ClientVariant::Elevated, ConnectionKind::Default),
    CheckId::new(ClusterRole::Target, ClientVariant::Elevated, ConnectionKind::Explicit),
    CheckId::new(ClusterRole::Hive, ClientVariant::Standard, ConnectionKind::Default),
    CheckId::new(ClusterRole::Hive, ClientVariant::Elevated, ConnectionKind::Default),
];

/// A step of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", content = "check", rename_all = "snake_case")]
pub enum Step {
    /// Resolving where the Hive URL comes from.
    ResolveHiveUrl,
    /// Opening the target connection.
    BuildConnection,
    /// Resolving the cluster identifier.
    LocateCluster,
    /// Finding the Hive and its connection.
    DiscoverHive,
    /// Building a client.
    BuildClient(CheckId),
    /// Validating a client.
    ValidateClient(CheckId),
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ResolveHiveUrl => f.write_str("resolve hive url"),
            Self::BuildConnection => f.write_str("build connection"),
            Self::LocateCluster => f.write_str("locate cluster"),
            Self::DiscoverHive => f.write_str("discover hive"),
            Self::BuildClient(check) => write!(f, "build {check}"),
            Self::ValidateClient(check) => write!(f, "validate {check}"),
        }
    }
}

/// A failed run: the step that failed and why.
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct RunError {
    /// The failing step.
    pub step: Step,
    /// The underlying error.
    #[source]
    pub source: BrokerError,
}

impl RunError {
    /// Classification of the underlying error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }
}

/// Receives human-readable progress from a run.
pub trait Progress: Send {
    /// A progress line.
    fn step(&mut self, message: &str);

    /// A divider between phases.
    fn divider(&mut self);

    /// Operator status from a validation read.
    fn operators(&mut self, operators: &[OperatorStatus]);

    /// A check passed.
    fn passed(&mut self, check: &CheckId);

    /// A check was not run.
    fn skipped(&mut self, check: &CheckId, why: &str);
}

/// Discards progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn step(&mut self, _message: &str) {}
    fn divider(&mut self) {}
    fn operators(&mut self, _operators: &[OperatorStatus]) {}
    fn passed(&mut self, _check: &CheckId) {}
    fn skipped(&mut self, _check: &CheckId, _why: &str) {}
}

/// Inputs of one run.
#[derive(Debug, Clone, Default)]
pub struct CheckOptions {
    /// Cluster identifier of any shape.
    pub cluster: String,
    /// Endpoint document for the Hive's control plane.
    pub hive_config: Option<PathBuf>,
    /// Hive control-plane URL given on the command line.
    pub hive_url: Option<String>,
    /// Elevation reason. Elevated checks are skipped when `None`.
    pub reason: Option<String>,
}

/// Result of one client check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CheckOutcome {
    /// The client was built and validated.
    Passed {
        /// Which check.
        check: CheckId,
        /// What validation observed.
        report: ValidationReport,
    },
    /// The check was not run.
    Skipped {
        /// Which check.
        check: CheckId,
        /// Why.
        reason: String,
    },
}

impl CheckOutcome {
    /// The check this outcome belongs to.
    #[must_use]
    pub fn check(&self) -> &CheckId {
        match self {
            Self::Passed { check, .. } | Self::Skipped { check, .. } => check,
        }
    }
}

/// Summary of a successful run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// The target cluster.
    pub cluster: ClusterRecord,
    /// Its Hive.
    pub hive: ClusterRecord,
    /// Where the Hive connection came from.
    pub hive_source: HiveSource,
    /// Where the Hive URL came from, if one was set.
    pub hive_url_source: Option<ValueSource>,
    /// Client checks in run order.
    pub checks: Vec<CheckOutcome>,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    /// Number of checks that passed.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.checks
            .iter()
            .filter(|c| matches!(c, CheckOutcome::Passed { .. }))
            .count()
    }
}

/// Runs the hive-login diagnostic.
pub struct HiveLoginCheck<'a> {
    control_plane: &'a dyn ControlPlane,
    settings: &'a Settings,
    cancel: CancellationToken,
}

impl<'a> HiveLoginCheck<'a> {
    /// Creates a run over a control plane and settings.
    #[must_use]
    pub fn new(control_plane: &'a dyn ControlPlane, settings: &'a Settings) -> Self {
        Self {
            control_plane,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses an external cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Executes the run, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first failing [`Step`] with its error. Every connection
    /// opened before the failure has been closed when this returns.
    pub async fn run(
        &self,
        options: &CheckOptions,
        progress: &mut dyn Progress,
    ) -> Result<RunReport, RunError> {
        let started_at = Utc::now();
        let builder = ConnectionBuilder::new(self.control_plane);

        let hive_url = self.resolve_hive_url(options, progress)?;
        let hive_url_source = hive_url.as_ref().map(|(_, source)| *source);
        let hive_url = hive_url.as_ref().map(|(url, _)| url.as_str());

        progress.step("Building connection from the environment...");
        let target_connection = self
            .guarded(
                Step::BuildConnection,
                builder.build(BuildMode::FromEnvironment(self.settings)),
            )
            .await?;

        let target = self
            .guarded(
                Step::LocateCluster,
                ClusterLocator::locate(&target_connection, &options.cluster),
            )
            .await?;
        if target.internal_id() != options.cluster.trim() {
            progress.step(&format!(
                "Using internal ID '{}' for provided cluster '{}'",
                target.internal_id(),
                options.cluster.trim()
            ));
        }
        progress.step(&format!("Fetched cluster {target}"));
        progress.divider();

        let link = self
            .guarded(
                Step::DiscoverHive,
                HiveDiscovery::new(builder).locate(
                    &target,
                    &target_connection,
                    options.hive_config.as_deref(),
                    hive_url,
                ),
            )
            .await?;
        if link.is_shared() {
            progress.step("No separate Hive config given, reusing the target connection");
        } else {
            progress.step(&format!(
                "Built Hive connection from {} at '{}'",
                link.source(),
                link.connection().url()
            ));
        }
        progress.step(&format!("Got Hive cluster {}", link.hive()));
        progress.divider();

        let factory = ClientFactory::new(&target_connection);
        let mut checks = Vec::with_capacity(CHECKS.len());
        for check in CHECKS {
            let reason = match (check.variant, options.reason.as_deref()) {
                (ClientVariant::Standard, _) => "",
                (ClientVariant::Elevated, Some(reason)) => reason,
                (ClientVariant::Elevated, None) => {
                    progress.skipped(&check, "no elevation reason given");
                    checks.push(CheckOutcome::Skipped {
                        check,
                        reason: "no elevation reason given".to_string(),
                    });
                    continue;
                }
            };

            let rediscovered = match (check.role, check.connection) {
                (ClusterRole::Hive, ConnectionKind::Default) => {
                    let found = self
                        .guarded(
                            Step::BuildClient(check),
                            HiveDiscovery::new(builder).locate(&target, &target_connection, None, hive_url),
                        )
                        .await?;
                    progress.step(&format!(
                        "Rediscovered Hive cluster {} through {}",
                        found.hive(),
                        found.source()
                    ));
                    Some(found)
                }
                _ => None,
            };

            let (cluster, connection) = match (check.role, &rediscovered) {
                (ClusterRole::Target, _) => (&target, &target_connection),
                (ClusterRole::Hive, Some(found)) => (found.hive(), found.connection()),
                (ClusterRole::Hive, None) => (link.hive(), link.connection()),
            };

            let build: BoxFuture<'_, crate::Result<KubeClient<'_>>> =
                match (check.role, check.variant, check.connection) {
                    (ClusterRole::Target, ClientVariant::Standard, ConnectionKind::Default) => {
                        Box::pin(factory.standard(cluster))
                    }
                    (ClusterRole::Target, ClientVariant::Elevated, ConnectionKind::Default) => {
                        Box::pin(factory.elevated(cluster, reason))
                    }
                    (_, ClientVariant::Standard, _) => {
                        Box::pin(factory.standard_with(cluster, connection))
                    }
                    (_, ClientVariant::Elevated, _) => {
                        Box::pin(factory.elevated_with(cluster, connection, reason))
                    }
                };

            let validator = match check.role {
                ClusterRole::Target => SessionValidator::new(),
                ClusterRole::Hive => SessionValidator::new().with_probe(ElevatedProbe::ClusterDeployment {
                    cluster_id: target.internal_id().to_string(),
                }),
            };

            let result = self.run_check(check, build, &validator, progress).await;
            if let Some(found) = rediscovered {
                found.close();
            }
            checks.push(CheckOutcome::Passed {
                check,
                report: result?,
            });
        }

        let hive = link.hive().clone();
        let hive_source = link.source().clone();
        link.close();
        target_connection.close();

        let report = RunReport {
            cluster: target,
            hive,
            hive_source,
            hive_url_source,
            checks,
            started_at,
            finished_at: Utc::now(),
        };
        info!(passed = report.passed(), "hive login run complete");
        progress.step("All checks passed");
        Ok(report)
    }

    async fn run_check<'c>(
        &self,
        check: CheckId,
        build: BoxFuture<'_, crate::Result<KubeClient<'c>>>,
        validator: &SessionValidator,
        progress: &mut dyn Progress,
    ) -> Result<ValidationReport, RunError> {
        progress.step(&format!("Attempting to create and test {check}..."));
        let client = self.guarded(Step::BuildClient(check), build).await?;
        progress.step(&format!(
            "Created {} client connection to cluster {}",
            client.variant(),
            client.cluster()
        ));

        let report = self
            .guarded(Step::ValidateClient(check), validator.validate(&client))
            .await?;
        progress.operators(&report.operators);
        if let Some(count) = report.namespaces {
            progress.step(&format!("Got '{count}' namespaces"));
        }
        if let Some(object) = &report.probe_object {
            progress.step(&format!("Fetched ClusterDeployment '{object}' using elevated client"));
        } else if let Some(probe) = &report.probe {
            progress.step(&format!("Elevated probe succeeded: {probe}"));
        }
        progress.passed(&check);
        progress.divider();
        Ok(report)
    }

    fn resolve_hive_url(
        &self,
        options: &CheckOptions,
        progress: &mut dyn Progress,
    ) -> Result<Option<(String, ValueSource)>, RunError> {
        let settings = self
            .settings
            .clone()
            .with_optional_override(HIVE_URL_KEY, options.hive_url.clone());
        match settings.resolve(HIVE_URL_KEY) {
            Ok(resolved) => {
                progress.step(&format!(
                    "Using Hive OCM URL from {}: '{}'",
                    resolved.source, resolved.value
                ));
                Ok(Some((resolved.value, resolved.source)))
            }
            Err(err) if err.is_not_found() => {
                progress.step("No separate Hive OCM URL set, using the target's settings");
                Ok(None)
            }
            Err(err) => Err(RunError {
                step: Step::ResolveHiveUrl,
                source: err.into(),
            }),
        }
    }

    async fn guarded<T>(
        &self,
        step: Step,
        operation: impl Future<Output = crate::Result<T>>,
    ) -> Result<T, RunError> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                warn!(%step, "run cancelled");
                Err(RunError { step, source: BrokerError::Cancelled })
            }
            result = operation => result.map_err(|source| {
                warn!(%step, error = %source, kind = %source.kind(), "step failed");
                RunError { step, source }
            }),
        }
    }
}

impl fmt::Debug for HiveLoginCheck<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HiveLoginCheck")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}
