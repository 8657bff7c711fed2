//! # hivelink-cli
//!
//! Command-line interface for the hivelink connection broker.
//!
//! Provides commands for:
//! - `hive-login`: locate a cluster, discover the Hive that manages it, and
//!   exercise every client variant against both
//! - `config`: show settings with the source each value came from, or
//!   write one into the settings file
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   Settings    ┌──────────────────┐   ControlPlane   ┌─────────┐
//! │ hivelink-cli │──────────────►│ hivelink-broker  │─────────────────►│   OCM   │
//! └──────────────┘               └──────────────────┘   (HTTP/JSON)    └─────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cli;
pub mod commands;
pub mod error;
pub mod output;

pub use cli::{Cli, Commands, ConfigArgs, Format, HiveLoginArgs};
pub use error::CliError;
pub use output::OutputFormat;
