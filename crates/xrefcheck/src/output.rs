//! Report rendering.
//!
//! Three blocks, in order: scan errors, invalid references, possible
//! copy/paste errors; then a one-line summary. Everything is grouped by
//! file and ordered by position, so CI logs diff cleanly between runs.

use std::fmt::Display;
use std::path::Path;

use owo_colors::{OwoColorize, Style};
use xrefcheck_core::{
    CopyPasteCheckResult, FileStatus, GatherScanError, RepoInfo, VerifyError, VerifyResultEntry,
};

/// Conditional styling: every colored string goes through here, so `--color
/// never` and `NO_COLOR` reliably strip escapes.
#[derive(Debug, Clone, Copy)]
pub struct Painter {
    enabled: bool,
}

impl Painter {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    fn paint(&self, text: impl Display, style: Style) -> String {
        if self.enabled {
            text.style(style).to_string()
        } else {
            text.to_string()
        }
    }

    pub fn header(&self, text: impl Display) -> String {
        self.paint(text, Style::new().bold())
    }

    pub fn file(&self, text: impl Display) -> String {
        self.paint(text, Style::new().cyan().bold())
    }

    pub fn error(&self, text: impl Display) -> String {
        self.paint(text, Style::new().red())
    }

    pub fn warn(&self, text: impl Display) -> String {
        self.paint(text, Style::new().yellow())
    }

    pub fn good(&self, text: impl Display) -> String {
        self.paint(text, Style::new().green())
    }

    pub fn dimmed(&self, text: impl Display) -> String {
        self.paint(text, Style::new().dimmed())
    }
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

/// The `=== Scan errors found ===` block.
pub fn render_scan_errors(
    root: &Path,
    errors: &[GatherScanError],
    painter: Painter,
) -> String {
    let mut output = String::new();
    output.push_str(&painter.header("=== Scan errors found ==="));
    output.push('\n');

    let mut last_file: Option<&Path> = None;
    for error in errors {
        let file = relative(root, &error.file);
        if last_file != Some(file) {
            output.push('\n');
            output.push_str(&format!("In file {}:\n", painter.file(file.display())));
            last_file = Some(file);
        }
        output.push_str(&format!(
            "  {} at {}: {}\n",
            painter.error("scan error"),
            error.position,
            error.kind
        ));
    }
    output
}

/// The `=== Invalid references found ===` block.
pub fn render_verify_errors(
    root: &Path,
    entries: &[VerifyResultEntry],
    painter: Painter,
) -> String {
    let mut output = String::new();
    output.push_str(&painter.header("=== Invalid references found ==="));
    output.push('\n');

    let mut last_file: Option<&Path> = None;
    for entry in entries {
        let file = relative(root, &entry.file);
        if last_file != Some(file) {
            output.push('\n');
            output.push_str(&format!("In file {}:\n", painter.file(file.display())));
            last_file = Some(file);
        }

        let reference = &entry.reference;
        output.push_str(&format!(
            "  {} ({}) at {}:\n",
            painter.error("bad reference"),
            reference.location(),
            reference.position
        ));
        output.push_str(&format!("    - text: {:?}\n", reference.text));
        output.push_str(&format!("    - link: {}\n", reference.link));
        if let Some(anchor) = &reference.anchor {
            output.push_str(&format!("    - anchor: {}\n", anchor));
        }
        output.push_str(&format!("    {}\n", painter.warn(&entry.error)));

        match &entry.error {
            VerifyError::AnchorDoesNotExist { suggestions, .. } if !suggestions.is_empty() => {
                output.push_str(&format!(
                    "    did you mean: {}\n",
                    painter.good(suggestions.join(", "))
                ));
            }
            VerifyError::AmbiguousAnchorRef { matches } => {
                for anchor in matches {
                    output.push_str(&format!(
                        "      {} {} at {}\n",
                        painter.dimmed(&anchor.kind),
                        anchor.name,
                        anchor.position
                    ));
                }
            }
            _ => {}
        }
    }
    output
}

/// The `=== Possible copy/paste errors ===` block. These are warnings: a
/// flagged pair may well be intentional, so they never affect the exit code.
pub fn render_copy_paste(
    root: &Path,
    results: &[CopyPasteCheckResult],
    painter: Painter,
) -> String {
    let mut output = String::new();
    output.push_str(&painter.header("=== Possible copy/paste errors ==="));
    output.push('\n');

    let mut last_file: Option<&Path> = None;
    for result in results {
        let file = relative(root, &result.file);
        if last_file != Some(file) {
            output.push('\n');
            output.push_str(&format!("In file {}:\n", painter.file(file.display())));
            last_file = Some(file);
        }
        output.push_str(&format!(
            "  {} at {}: {:?} -> {}\n",
            painter.warn("copied reference"),
            result.copied.position,
            result.copied.text,
            result.copied.full_target()
        ));
        output.push_str(&format!(
            "    looks copied from {:?} at {}\n",
            result.original.text, result.original.position
        ));
    }
    output
}

/// Verbose dump of the scanned repository, before verification.
pub fn render_repo_dump(repo: &RepoInfo) -> String {
    let mut output = String::new();
    output.push_str(&format!("=== Repository at {} ===\n", repo.root.display()));
    for (path, status) in &repo.files {
        let file = relative(&repo.root, path);
        match status {
            FileStatus::Scanned(info) => {
                output.push_str(&format!(
                    "{}: {} references, {} anchors\n",
                    file.display(),
                    info.references.len(),
                    info.anchors.len()
                ));
                for reference in &info.references {
                    let ignored = if reference.ignored { " (ignored)" } else { "" };
                    output.push_str(&format!(
                        "  ref {:?} -> {} at {}{}\n",
                        reference.text,
                        reference.full_target(),
                        reference.position,
                        ignored
                    ));
                }
                for anchor in &info.anchors {
                    output.push_str(&format!(
                        "  anchor {} ({}) at {}\n",
                        anchor.name, anchor.kind, anchor.position
                    ));
                }
            }
            FileStatus::NotScannable => {
                output.push_str(&format!("{}: not scannable\n", file.display()));
            }
            FileStatus::NotAddedToGit => {
                output.push_str(&format!("{}: not added to git\n", file.display()));
            }
        }
    }
    output
}

/// Final one-liner after the blocks.
pub fn render_summary(
    scan_errors: usize,
    verify_errors: usize,
    interrupted: bool,
    painter: Painter,
) -> String {
    if interrupted {
        return painter.warn("Interrupted; results are partial.");
    }
    if scan_errors == 0 && verify_errors == 0 {
        return painter.good("All references are valid.");
    }
    let mut parts = Vec::new();
    if scan_errors > 0 {
        parts.push(format!("{} scan errors", scan_errors));
    }
    if verify_errors > 0 {
        parts.push(format!("{} invalid references", verify_errors));
    }
    painter.error(format!("Found {}.", parts.join(" and ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use xrefcheck_core::{Position, Reference, ScanErrorKind};

    fn entry(file: &str, line: usize, error: VerifyError) -> VerifyResultEntry {
        VerifyResultEntry {
            file: PathBuf::from("/repo").join(file),
            reference: Reference {
                text: "go".into(),
                link: "./a.md".into(),
                anchor: Some("section-one".into()),
                position: Position::new(line, 3),
                copy_paste_check: true,
                ignored: false,
            },
            error,
        }
    }

    #[test]
    fn verify_errors_render_positions_and_suggestions() {
        let entries = vec![entry(
            "docs/guide.md",
            4,
            VerifyError::AnchorDoesNotExist {
                anchor: "section-one".into(),
                suggestions: vec!["section-two".into()],
            },
        )];
        let text = render_verify_errors(Path::new("/repo"), &entries, Painter::new(false));
        assert!(text.contains("=== Invalid references found ==="));
        assert!(text.contains("In file docs/guide.md:"));
        assert!(text.contains("at 4:3"));
        assert!(text.contains("did you mean: section-two"));
        // No escape codes with colors disabled.
        assert!(!text.contains('\u{1b}'));
    }

    #[test]
    fn files_are_grouped_once() {
        let entries = vec![
            entry("a.md", 1, VerifyError::ExternalResourceTimeout),
            entry("a.md", 9, VerifyError::ExternalResourceTimeout),
        ];
        let text = render_verify_errors(Path::new("/repo"), &entries, Painter::new(false));
        assert_eq!(text.matches("In file a.md:").count(), 1);
    }

    #[test]
    fn scan_errors_render_kind_descriptions() {
        let errors = vec![GatherScanError {
            file: PathBuf::from("/repo/a.md"),
            position: Position::new(2, 1),
            kind: ScanErrorKind::IgnoreAllMisplaced,
        }];
        let text = render_scan_errors(Path::new("/repo"), &errors, Painter::new(false));
        assert!(text.contains("=== Scan errors found ==="));
        assert!(text.contains("at 2:1"));
        assert!(text.contains("top of the file"));
    }

    #[test]
    fn summary_states_the_outcome() {
        let painter = Painter::new(false);
        assert_eq!(
            render_summary(0, 0, false, painter),
            "All references are valid."
        );
        assert!(render_summary(2, 0, false, painter).contains("2 scan errors"));
        assert!(render_summary(1, 3, false, painter).contains("3 invalid references"));
        assert!(render_summary(0, 0, true, painter).contains("partial"));
    }
}
