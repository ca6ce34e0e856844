//! xrefcheck - Verify cross-references in repository documentation
//!
//! Exit codes: 0 when every reference verifies, 1 on scan or verification
//! errors, 2 on configuration or environment failures.

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use xrefcheck::cli::{Cli, Command};
use xrefcheck::RunOutcome;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Some(Command::Check(args)) => xrefcheck::run_check(args),
        Some(Command::DumpConfig { config }) => xrefcheck::run_dump_config(config.as_deref()),
        None => xrefcheck::run_check(cli.check),
    };

    match outcome {
        Ok(RunOutcome::Clean) => ExitCode::SUCCESS,
        Ok(RunOutcome::Failed) => ExitCode::from(1),
        Err(error) => {
            eprintln!("Error: {:#}", error);
            ExitCode::from(2)
        }
    }
}
