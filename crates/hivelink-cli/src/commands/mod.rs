//! Command implementations.

mod config;
mod hive_login;

pub use config::ConfigCommand;
pub use hive_login::HiveLoginCommand;
