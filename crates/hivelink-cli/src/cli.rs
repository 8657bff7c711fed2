//! Command-line argument parsing with clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// hivelink - connect to managed clusters and their Hive.
#[derive(Parser, Debug, Clone)]
#[command(name = "hivelink")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Settings file (TOML).
    #[arg(long, global = true, env = "HIVELINK_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format.
    #[arg(short, long, global = true, value_enum, default_value_t = Format::Table)]
    pub format: Format,

    /// Verbose logging.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Format {
    /// Human-readable output.
    #[default]
    Table,
    /// JSON output for scripting.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Test login to a target cluster and its Hive with every client variant.
    HiveLogin(HiveLoginArgs),

    /// Show or set settings.
    Config(ConfigArgs),
}

/// Arguments for `hive-login`.
#[derive(Args, Debug, Clone)]
pub struct HiveLoginArgs {
    /// Cluster internal ID, external ID or display name.
    #[arg(short = 'C', long)]
    pub cluster_id: String,

    /// Endpoint document for the Hive's control plane, if different from the cluster's.
    #[arg(long)]
    pub hive_ocm_config: Option<PathBuf>,

    /// Control-plane URL for the Hive, if different from the cluster's.
    #[arg(long)]
    pub hive_ocm_url: Option<String>,

    /// Elevation reason. Elevated checks are skipped without one.
    #[arg(long)]
    pub reason: Option<String>,

    /// Backplane API URL for logins through the cluster's control plane.
    #[arg(long)]
    pub backplane_url: Option<String>,

    /// Backplane API URL for logins through the Hive's control plane.
    #[arg(long)]
    pub hive_backplane_url: Option<String>,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

/// Arguments for `config`.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Key to show or set.
    #[arg(long)]
    pub key: Option<String>,

    /// Value to write into the settings file.
    #[arg(long, requires = "key")]
    pub value: Option<String>,
}
