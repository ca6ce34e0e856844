//! File enumeration through the version control system.
//!
//! The scanner never walks the filesystem itself; the set of in-scope files
//! is exactly what git reports, so ignored build artifacts and editor litter
//! stay invisible.

use std::path::Path;
use std::process::Command;

use eyre::{bail, Result, WrapErr};

/// Paths of tracked files, relative to `root`.
pub fn ls_tracked(root: &Path) -> Result<Vec<String>> {
    run_ls_files(root, &["ls-files"])
}

/// Paths of untracked-but-not-ignored files, relative to `root`.
pub fn ls_untracked(root: &Path) -> Result<Vec<String>> {
    run_ls_files(root, &["ls-files", "--others", "--exclude-standard"])
}

fn run_ls_files(root: &Path, args: &[&str]) -> Result<Vec<String>> {
    let output = Command::new("git")
        // Without this, git C-quotes any path containing non-ASCII bytes.
        .args(["-c", "core.quotepath=off"])
        .args(args)
        .current_dir(root)
        .output()
        .wrap_err("cannot run git; is it installed and on PATH?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "git {} failed in {}: {}",
            args.join(" "),
            root.display(),
            stderr.trim()
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
