//! Terminal progress line and environment detection.

use std::io::{IsTerminal, Write};
use std::sync::Arc;

use xrefcheck_core::{Progress, VerifyProgress};

/// Environment variables that indicate a CI environment.
const CI_VARS: &[&str] = &[
    "CI",
    "TF_BUILD",
    "GITHUB_ACTIONS",
    "BUILD_ID",
    "TEAMCITY_VERSION",
];

pub fn is_ci() -> bool {
    CI_VARS.iter().any(|name| match std::env::var(name) {
        Ok(value) => !(value.is_empty() || value == "false" || value == "0"),
        Err(_) => false,
    })
}

/// `NO_COLOR` set to anything non-empty forces color off.
pub fn no_color() -> bool {
    std::env::var_os("NO_COLOR").is_some_and(|value| !value.is_empty())
}

pub fn stdout_is_terminal() -> bool {
    std::io::stdout().is_terminal()
}

pub fn stderr_is_terminal() -> bool {
    std::io::stderr().is_terminal()
}

/// A single rewritten line on stderr showing verification progress.
///
/// When disabled this is a no-op surface; the underlying counters still
/// advance, so the final summary never depends on the bar being visible.
pub struct ProgressBar {
    enabled: bool,
    progress: Arc<VerifyProgress>,
}

impl ProgressBar {
    pub fn new(enabled: bool, progress: Arc<VerifyProgress>) -> Self {
        Self { enabled, progress }
    }

    pub fn draw(&self) {
        if !self.enabled {
            return;
        }
        let line = self.line();
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K{}", line);
        let _ = stderr.flush();
    }

    /// Erase the line so the report starts at column zero.
    pub fn clear(&self) {
        if !self.enabled {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = write!(stderr, "\r\x1b[2K");
        let _ = stderr.flush();
    }

    fn line(&self) -> String {
        let mut line = format!(
            "Verifying: local {} | external {}",
            counter(&self.progress.local),
            counter(&self.progress.external),
        );
        let retrying = self.progress.external_fixable.total();
        if retrying > 0 {
            line.push_str(&format!(" | {} rate-limited", retrying));
        }
        let errors = self.progress.local.errors() + self.progress.external.errors();
        if errors > 0 {
            line.push_str(&format!(" | {} errors", errors));
        }
        line
    }
}

fn counter(progress: &Progress) -> String {
    format!("{}/{}", progress.done(), progress.total())
}
