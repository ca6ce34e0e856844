//! xrefcheck - Verify cross-references in repository documentation
//!
//! The binary is a thin wrapper over [`run_check`] and [`run_dump_config`];
//! the library form exists so integration tests can drive whole runs
//! without spawning a process.

pub mod cli;
pub mod config;
pub mod display;
pub mod output;

use std::sync::Arc;
use std::time::Duration;

use eyre::Result;
use xrefcheck_core::{
    cancel_pair, paths, scan_repo, verify_repo, ExternalProbe, Flavor, HttpProbe,
    MarkdownScanner, ScanMode, ScannerRegistry, VerifyProgress, VerifyResult,
};

use cli::{CheckArgs, ColorArg};
use config::Config;
use output::Painter;

/// Outcome of a whole run, for exit-code mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every reference verified.
    Clean,
    /// Scan or verify errors were reported (exit 1).
    Failed,
}

/// The `check` flow: scan, verify, report.
pub fn run_check(args: CheckArgs) -> Result<RunOutcome> {
    let root = paths::canonicalize(&args.root)?;

    let mut config = Config::resolve(args.config.as_deref(), &root)?;
    config.apply_overrides(&args);

    let colors = match args.color {
        ColorArg::Always => true,
        ColorArg::Never => false,
        ColorArg::Auto => !display::no_color() && display::stdout_is_terminal(),
    };
    let painter = Painter::new(colors);

    // All pattern compilation happens before scanning; a bad pattern is a
    // configuration error, not a verification failure.
    let scan_ignore = config.scan_ignore(&root)?;
    let verify_config = config.to_verify_config(&root, args.mode.to_verify_mode())?;
    let flavor = verify_config.flavor;

    let registry = default_registry(flavor);

    let scan_mode = if args.include_untracked {
        ScanMode::IncludeUntracked
    } else {
        ScanMode::OnlyTracked
    };
    let (repo, scan_errors) = scan_repo(&root, &registry, scan_mode, &scan_ignore)?;

    if args.verbose {
        println!("{}", output::render_repo_dump(&repo));
    }

    let progress = Arc::new(VerifyProgress::new());
    let progress_enabled = !args.no_progress_bar
        && (args.progress_bar || (!display::is_ci() && display::stderr_is_terminal()));
    let bar = display::ProgressBar::new(progress_enabled, Arc::clone(&progress));

    let probe: Arc<dyn ExternalProbe> = Arc::new(HttpProbe::new()?);
    let verify_config = Arc::new(verify_config);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let result: VerifyResult = runtime.block_on(async {
        let (cancel_handle, cancel_flag) = cancel_pair();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel_handle.cancel();
            }
        });

        let verifying = verify_repo(
            &repo,
            Arc::clone(&verify_config),
            probe,
            Arc::clone(&progress),
            cancel_flag,
        );
        tokio::pin!(verifying);

        let mut ticker = tokio::time::interval(Duration::from_millis(100));
        loop {
            tokio::select! {
                result = &mut verifying => break result,
                _ = ticker.tick() => bar.draw(),
            }
        }
    });
    bar.clear();

    if !scan_errors.is_empty() {
        println!("{}", output::render_scan_errors(&root, &scan_errors, painter));
    }
    let verify_error_count = match result.verify_errors() {
        Some(entries) => {
            println!("{}", output::render_verify_errors(&root, entries, painter));
            entries.len()
        }
        None => 0,
    };
    if !result.copy_paste_results().is_empty() {
        println!(
            "{}",
            output::render_copy_paste(&root, result.copy_paste_results(), painter)
        );
    }
    println!(
        "{}",
        output::render_summary(
            scan_errors.len(),
            verify_error_count,
            result.interrupted(),
            painter
        )
    );

    let clean =
        scan_errors.is_empty() && verify_error_count == 0 && !result.interrupted();
    Ok(if clean {
        RunOutcome::Clean
    } else {
        RunOutcome::Failed
    })
}

/// The `dump-config` flow: print the effective configuration as YAML.
pub fn run_dump_config(explicit: Option<&std::path::Path>) -> Result<RunOutcome> {
    let root = paths::canonicalize(std::path::Path::new("."))?;
    let config = Config::resolve(explicit, &root)?;
    print!("{}", config.to_yaml()?);
    Ok(RunOutcome::Clean)
}

/// The default scanner registry: Markdown only, but the table is open.
pub fn default_registry(flavor: Flavor) -> ScannerRegistry {
    let mut registry = ScannerRegistry::new();
    registry.register(Box::new(MarkdownScanner::new(flavor)));
    registry
}
