//! `hive-login` command.

use std::io::Write;
use std::time::Duration;

use hivelink_broker::{CheckOptions, ControlPlane, HiveLoginCheck, OcmControlPlane, RunReport};
use hivelink_config::endpoint::URL_KEY;
use hivelink_config::{
    BACKPLANE_URL_KEY, DEFAULT_API_URL, HIVE_BACKPLANE_URL_KEY, HIVE_URL_KEY, Settings,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::HiveLoginArgs;
use crate::error::CliError;
use crate::output::{LineProgress, OutputFormat};

/// Runs the hive-login diagnostic.
#[derive(Debug)]
pub struct HiveLoginCommand<'a> {
    settings: &'a Settings,
    cancel: CancellationToken,
}

impl<'a> HiveLoginCommand<'a> {
    /// Create a new command over the loaded settings.
    #[must_use]
    pub fn new(settings: &'a Settings, cancel: CancellationToken) -> Self {
        Self { settings, cancel }
    }

    /// Execute against the HTTP control plane.
    ///
    /// Progress lines go to `progress`; the final report goes to `writer`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built, the run fails,
    /// or output cannot be written.
    pub async fn execute<W, P>(
        &self,
        writer: &mut W,
        progress: P,
        format: &OutputFormat,
        args: &HiveLoginArgs,
    ) -> Result<(), CliError>
    where
        W: Write,
        P: Write + Send,
    {
        let control_plane = self.control_plane(args)?;
        let report = self
            .run(&control_plane, progress, args)
            .await?;
        format.write(writer, &report)?;
        Ok(())
    }

    /// Builds the HTTP control plane with each environment's backplane pinned.
    ///
    /// Backplane URLs left unset are read from each control plane's
    /// environment record at login.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn control_plane(&self, args: &HiveLoginArgs) -> Result<OcmControlPlane, CliError> {
        let settings = self
            .settings
            .clone()
            .with_optional_override(BACKPLANE_URL_KEY, args.backplane_url.clone())
            .with_optional_override(HIVE_BACKPLANE_URL_KEY, args.hive_backplane_url.clone())
            .with_optional_override(HIVE_URL_KEY, args.hive_ocm_url.clone());

        let mut control_plane = OcmControlPlane::new(Duration::from_secs(args.timeout))?;
        if let Some(hive_url) = settings.get(HIVE_URL_KEY) {
            control_plane =
                control_plane.with_backplane_url(&hive_url, settings.get(HIVE_BACKPLANE_URL_KEY));
        }
        let target_url = settings
            .get(URL_KEY)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        Ok(control_plane.with_backplane_url(&target_url, settings.get(BACKPLANE_URL_KEY)))
    }

    /// Run against any control plane.
    ///
    /// # Errors
    ///
    /// Returns the failing step of the run.
    pub async fn run<P: Write + Send>(
        &self,
        control_plane: &dyn ControlPlane,
        progress: P,
        args: &HiveLoginArgs,
    ) -> Result<RunReport, CliError> {
        let options = CheckOptions {
            cluster: args.cluster_id.clone(),
            hive_config: args.hive_ocm_config.clone(),
            hive_url: args.hive_ocm_url.clone(),
            reason: args.reason.clone(),
        };
        info!(cluster = %options.cluster, "starting hive login checks");

        let mut progress = LineProgress::new(progress);
        let report = HiveLoginCheck::new(control_plane, self.settings)
            .with_cancellation(self.cancel.clone())
            .run(&options, &mut progress)
            .await?;
        Ok(report)
    }
}
