//! Repository scanning: VCS enumeration, per-extension dispatch, and the
//! assembly of [`RepoInfo`].
//!
//! Parse errors are two-stage: scanners are context-free and report only a
//! position and a kind; the repository scanner promotes them by attaching
//! the owning file path. A file that fails to parse still contributes its
//! partial contents, and never aborts the scan of other files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use thiserror::Error;

use crate::git;
use crate::paths::{join, GlobList};
use crate::reference::{DirStatus, FileInfo, FileStatus, Position, RepoInfo};

/// What went wrong while parsing a file, positionally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanErrorKind {
    #[error("expected a link after the \"ignore link\" annotation")]
    ExpectedLinkAfterIgnoreLink,
    #[error("\"ignore all\" must be placed at the top of the file")]
    IgnoreAllMisplaced,
    #[error("expected a paragraph after the \"ignore paragraph\" annotation, found {found}")]
    ExpectedParagraphAfterIgnoreParagraph { found: String },
    #[error("unrecognised option {option:?} in an xrefcheck annotation")]
    UnrecognisedIgnoreOption { option: String },
}

/// A parse error as a scanner reports it: no file attached yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseScanError {
    pub position: Position,
    pub kind: ScanErrorKind,
}

impl ParseScanError {
    pub fn new(position: Position, kind: ScanErrorKind) -> Self {
        Self { position, kind }
    }

    /// Promote to a gather error by attaching the owning file.
    pub fn in_file(self, file: impl Into<PathBuf>) -> GatherScanError {
        GatherScanError {
            file: file.into(),
            position: self.position,
            kind: self.kind,
        }
    }
}

/// A parse error with its owning file, as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatherScanError {
    pub file: PathBuf,
    pub position: Position,
    pub kind: ScanErrorKind,
}

/// A format-specific scanner, registered by file extension.
pub trait FileScanner: Send + Sync {
    /// Extensions this scanner claims, without the leading dot.
    fn extensions(&self) -> &[&str];

    /// Parse file content; accumulates errors instead of failing fast.
    fn scan(&self, content: &str) -> (FileInfo, Vec<ParseScanError>);
}

/// The `extension → scanner` dispatch table, built once at startup.
#[derive(Default)]
pub struct ScannerRegistry {
    scanners: Vec<Box<dyn FileScanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Box<dyn FileScanner>) {
        self.scanners.push(scanner);
    }

    fn find(&self, extension: &str) -> Option<&dyn FileScanner> {
        self.scanners
            .iter()
            .find(|scanner| scanner.extensions().contains(&extension))
            .map(Box::as_ref)
    }

    fn recognizes(&self, path: &Path) -> bool {
        self.scanner_for(path).is_some()
    }

    fn scanner_for(&self, path: &Path) -> Option<&dyn FileScanner> {
        let extension = path.extension()?.to_str()?;
        self.find(extension)
    }
}

/// Which VCS states count as in scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Only `git ls-files` output.
    #[default]
    OnlyTracked,
    /// Tracked plus untracked-but-not-ignored files.
    IncludeUntracked,
}

/// Scan an entire repository.
///
/// `root` must be canonical. Returns the assembled [`RepoInfo`] together
/// with all gather errors, sorted by file and position.
pub fn scan_repo(
    root: &Path,
    registry: &ScannerRegistry,
    mode: ScanMode,
    ignore: &GlobList,
) -> Result<(RepoInfo, Vec<GatherScanError>)> {
    let tracked = git::ls_tracked(root)?;
    let untracked = git::ls_untracked(root)?;

    let mut repo = RepoInfo {
        files: BTreeMap::new(),
        directories: BTreeMap::new(),
        root: root.to_path_buf(),
    };
    repo.directories.insert(root.to_path_buf(), DirStatus::Tracked);
    let mut errors = Vec::new();

    for relative in &tracked {
        let path = join(root, relative);
        if ignore.is_match(&path) {
            continue;
        }
        index_directories(&mut repo, root, &path, DirStatus::Tracked);
        let status = scan_file(registry, &path, &mut errors)?;
        repo.files.insert(path, status);
    }

    match mode {
        ScanMode::IncludeUntracked => {
            for relative in &untracked {
                let path = join(root, relative);
                if ignore.is_match(&path) {
                    continue;
                }
                index_directories(&mut repo, root, &path, DirStatus::Untracked);
                let status = scan_file(registry, &path, &mut errors)?;
                repo.files.entry(path).or_insert(status);
            }
        }
        ScanMode::OnlyTracked => {
            // Recognized files that exist on disk but are unknown to git are
            // a common mistake; surface them instead of silently reporting
            // their references as broken elsewhere.
            for relative in &untracked {
                let path = join(root, relative);
                if ignore.is_match(&path) || !registry.recognizes(&path) {
                    continue;
                }
                tracing::warn!(
                    file = %relative,
                    "file is not tracked by git and will not be scanned"
                );
                index_directories(&mut repo, root, &path, DirStatus::Untracked);
                repo.files.entry(path).or_insert(FileStatus::NotAddedToGit);
            }
        }
    }

    errors.sort_by(|a, b| a.file.cmp(&b.file).then(a.position.cmp(&b.position)));
    Ok((repo, errors))
}

fn scan_file(
    registry: &ScannerRegistry,
    path: &Path,
    errors: &mut Vec<GatherScanError>,
) -> Result<FileStatus> {
    let Some(scanner) = registry.scanner_for(path) else {
        return Ok(FileStatus::NotScannable);
    };
    let bytes =
        std::fs::read(path).wrap_err_with(|| format!("cannot read {}", path.display()))?;
    let content = String::from_utf8_lossy(&bytes);
    let (info, parse_errors) = scanner.scan(&content);
    errors.extend(parse_errors.into_iter().map(|e| e.in_file(path)));
    Ok(FileStatus::Scanned(info))
}

/// Record every directory between the root and `path`; tracked wins when a
/// directory holds both tracked and untracked files.
fn index_directories(repo: &mut RepoInfo, root: &Path, path: &Path, status: DirStatus) {
    let mut dir = path.parent();
    while let Some(current) = dir {
        if !current.starts_with(root) || current == root {
            break;
        }
        match status {
            DirStatus::Tracked => {
                repo.directories.insert(current.to_path_buf(), DirStatus::Tracked);
            }
            DirStatus::Untracked => {
                repo.directories
                    .entry(current.to_path_buf())
                    .or_insert(DirStatus::Untracked);
            }
        }
        dir = current.parent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullScanner;

    impl FileScanner for NullScanner {
        fn extensions(&self) -> &[&str] {
            &["md", "markdown"]
        }

        fn scan(&self, _content: &str) -> (FileInfo, Vec<ParseScanError>) {
            (FileInfo::default(), Vec::new())
        }
    }

    #[test]
    fn registry_dispatches_by_extension() {
        let mut registry = ScannerRegistry::new();
        registry.register(Box::new(NullScanner));

        assert!(registry.recognizes(Path::new("/r/a.md")));
        assert!(registry.recognizes(Path::new("/r/a.markdown")));
        assert!(!registry.recognizes(Path::new("/r/a.rs")));
        assert!(!registry.recognizes(Path::new("/r/no-extension")));
    }

    #[test]
    fn directory_index_tracked_wins() {
        let root = PathBuf::from("/repo");
        let mut repo = RepoInfo {
            root: root.clone(),
            ..Default::default()
        };

        index_directories(
            &mut repo,
            &root,
            Path::new("/repo/docs/deep/a.md"),
            DirStatus::Untracked,
        );
        assert_eq!(
            repo.directories.get(Path::new("/repo/docs")),
            Some(&DirStatus::Untracked)
        );

        index_directories(
            &mut repo,
            &root,
            Path::new("/repo/docs/b.md"),
            DirStatus::Tracked,
        );
        assert_eq!(
            repo.directories.get(Path::new("/repo/docs")),
            Some(&DirStatus::Tracked)
        );
        assert_eq!(
            repo.directories.get(Path::new("/repo/docs/deep")),
            Some(&DirStatus::Untracked)
        );
    }

    #[test]
    fn scan_error_promotion_keeps_payload() {
        let parse = ParseScanError::new(
            Position::new(3, 7),
            ScanErrorKind::UnrecognisedIgnoreOption {
                option: "frobnicate".into(),
            },
        );
        let gathered = parse.clone().in_file("/repo/docs/a.md");
        assert_eq!(gathered.position, parse.position);
        assert_eq!(gathered.kind, parse.kind);
        assert_eq!(gathered.file, PathBuf::from("/repo/docs/a.md"));
    }
}
