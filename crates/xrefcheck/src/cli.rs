//! Command line surface.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use xrefcheck_core::VerifyMode;

use crate::config::parse_duration;

#[derive(Debug, Parser)]
#[command(
    name = "xrefcheck",
    version,
    about = "Verify cross-references in repository documentation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// With no subcommand, `check` runs with these flags.
    #[command(flatten)]
    pub check: CheckArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Scan the repository and verify every reference (the default)
    Check(CheckArgs),
    /// Print the effective configuration as YAML
    DumpConfig {
        /// Path to the configuration file
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Args)]
pub struct CheckArgs {
    /// Path to the configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Repository root to scan
    #[arg(long, value_name = "PATH", default_value = ".")]
    pub root: PathBuf,

    /// Which verification families to run
    #[arg(long, value_enum, default_value_t = ModeArg::Full)]
    pub mode: ModeArg,

    /// Dump the scanned repository before verification
    #[arg(long)]
    pub verbose: bool,

    /// Force the progress bar on (default: on outside CI)
    #[arg(long, overrides_with = "no_progress_bar")]
    pub progress_bar: bool,

    /// Force the progress bar off
    #[arg(long)]
    pub no_progress_bar: bool,

    /// When to color the output
    #[arg(long, value_enum, default_value_t = ColorArg::Auto)]
    pub color: ColorArg,

    /// Also scan files present in the work tree but not tracked by git
    #[arg(long)]
    pub include_untracked: bool,

    /// Glob of paths dropped from scanning entirely (repeatable)
    #[arg(long = "ignored", value_name = "GLOB")]
    pub ignored: Vec<String>,

    /// Glob of files whose references are not verified (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub ignore_refs_from: Vec<String>,

    /// Glob of local targets accepted without checking (repeatable)
    #[arg(long, value_name = "GLOB")]
    pub ignore_local_refs_to: Vec<String>,

    /// Regex of external URLs accepted without probing (repeatable)
    #[arg(long, value_name = "REGEX")]
    pub ignore_external_refs_to: Vec<String>,

    /// Timeout per external request, e.g. 10s
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub external_timeout: Option<Duration>,

    /// Treat 401/403 responses as healthy
    #[arg(long, overrides_with = "no_ignore_auth_failures")]
    pub ignore_auth_failures: bool,

    /// Treat 401/403 responses as failures
    #[arg(long)]
    pub no_ignore_auth_failures: bool,

    /// Wait this long on a 429 without a Retry-After header
    #[arg(long, value_name = "DURATION", value_parser = parse_duration_arg)]
    pub default_retry_after: Option<Duration>,

    /// Retry a rate-limited URL at most this many times
    #[arg(long, value_name = "N")]
    pub max_retries: Option<usize>,
}

fn parse_duration_arg(text: &str) -> Result<Duration, String> {
    parse_duration(text)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Local,
    External,
    Full,
}

impl ModeArg {
    pub fn to_verify_mode(self) -> VerifyMode {
        match self {
            ModeArg::Local => VerifyMode::LocalOnly,
            ModeArg::External => VerifyMode::ExternalOnly,
            ModeArg::Full => VerifyMode::Full,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorArg {
    Always,
    Never,
    Auto,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_invocation_defaults_to_check_with_full_mode() {
        let cli = Cli::try_parse_from(["xrefcheck"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.check.mode, ModeArg::Full);
        assert_eq!(cli.check.root, PathBuf::from("."));
        assert_eq!(cli.check.color, ColorArg::Auto);
    }

    #[test]
    fn top_level_flags_work_without_a_subcommand() {
        let cli = Cli::try_parse_from([
            "xrefcheck",
            "--mode",
            "local",
            "--root",
            "docs",
            "--include-untracked",
            "--verbose",
        ])
        .unwrap();
        assert_eq!(cli.check.mode, ModeArg::Local);
        assert_eq!(cli.check.root, PathBuf::from("docs"));
        assert!(cli.check.include_untracked);
        assert!(cli.check.verbose);
    }

    #[test]
    fn check_subcommand_accepts_the_same_flags() {
        let cli = Cli::try_parse_from([
            "xrefcheck",
            "check",
            "--mode",
            "external",
            "--external-timeout",
            "30s",
            "--max-retries",
            "5",
        ])
        .unwrap();
        let Some(Command::Check(args)) = cli.command else {
            panic!("expected check subcommand");
        };
        assert_eq!(args.mode, ModeArg::External);
        assert_eq!(args.external_timeout, Some(Duration::from_secs(30)));
        assert_eq!(args.max_retries, Some(5));
    }

    #[test]
    fn repeatable_exclusion_flags_accumulate() {
        let cli = Cli::try_parse_from([
            "xrefcheck",
            "--ignored",
            "vendor/**",
            "--ignored",
            "dist/**",
            "--ignore-external-refs-to",
            "^https://intranet\\.",
        ])
        .unwrap();
        assert_eq!(cli.check.ignored, vec!["vendor/**", "dist/**"]);
        assert_eq!(cli.check.ignore_external_refs_to.len(), 1);
    }

    #[test]
    fn bad_duration_flag_is_rejected() {
        assert!(Cli::try_parse_from(["xrefcheck", "--external-timeout", "soon"]).is_err());
    }

    #[test]
    fn dump_config_subcommand_parses() {
        let cli = Cli::try_parse_from(["xrefcheck", "dump-config"]).unwrap();
        assert!(matches!(cli.command, Some(Command::DumpConfig { .. })));
    }
}
