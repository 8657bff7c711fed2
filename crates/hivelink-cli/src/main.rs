//! hivelink binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use hivelink_cli::cli::{Cli, Commands};
use hivelink_cli::commands::{ConfigCommand, HiveLoginCommand};
use hivelink_cli::output::OutputFormat;
use hivelink_config::{Environment, Settings, file};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), hivelink_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let path = cli.config.clone().or_else(file::default_path);
    let settings = Settings::load(Environment::capture(), path.as_deref())?;

    match cli.command {
        Commands::HiveLogin(args) => {
            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, cancelling");
                    on_signal.cancel();
                }
            });

            // JSON keeps stdout clean for the report.
            let cmd = HiveLoginCommand::new(&settings, cancel);
            if format.is_json() {
                cmd.execute(&mut io::stdout(), io::stderr(), &format, &args).await?;
            } else {
                cmd.execute(&mut io::stdout(), io::stdout(), &format, &args).await?;
            }
        }
        Commands::Config(args) => {
            let cmd = ConfigCommand::new(&settings);
            cmd.execute(&mut io::stdout().lock(), &format, &args)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivelink_cli::cli::Format;

    #[test]
    fn cli_parses_hive_login() {
        let cli = Cli::parse_from(["hivelink", "hive-login", "-C", "abc"]);
        assert!(matches!(cli.command, Commands::HiveLogin(_)));
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["hivelink", "--format", "json", "config"]);
        assert_eq!(cli.format, Format::Json);
    }
}
