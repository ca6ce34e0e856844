//! xrefcheck-core - Verify cross-references in repository documentation
//!
//! This crate provides the building blocks for:
//! - Scanning a git repository's Markdown files into a reference/anchor graph
//! - Canonical anchor slugs with flavor-dependent rules and fuzzy suggestions
//! - Verifying local references, in-document anchors, and external URLs with
//!   rate-limit-aware concurrent probing
//!
//! # Scanning
//!
//! Files are enumerated through git (never by walking the filesystem), then
//! dispatched to a per-extension scanner:
//!
//! ```no_run
//! use xrefcheck_core::{
//!     Flavor, GlobList, MarkdownScanner, ScanMode, ScannerRegistry, scan_repo,
//! };
//!
//! # fn main() -> eyre::Result<()> {
//! let root = xrefcheck_core::paths::canonicalize(std::path::Path::new("."))?;
//! let mut registry = ScannerRegistry::new();
//! registry.register(Box::new(MarkdownScanner::new(Flavor::GitHub)));
//!
//! let ignore = GlobList::empty(&root);
//! let (repo, scan_errors) = scan_repo(&root, &registry, ScanMode::OnlyTracked, &ignore)?;
//! println!("{} files, {} scan errors", repo.files.len(), scan_errors.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Verifying
//!
//! Verification reads the scanned [`RepoInfo`] immutably and probes external
//! URLs concurrently; see [`verify_repo`]. Progress flows through shared
//! [`VerifyProgress`] counters, and a [`CancelFlag`] aborts in-flight probes
//! at their next await point.

pub mod anchor;
pub mod git;
pub mod markdown;
pub mod paths;
pub mod progress;
pub mod reference;
pub mod scan;
pub mod verify;

pub use anchor::{
    similarity, strip_anchor_dup_no, suggest_anchors, Anchor, AnchorType, DupSuffixer, Flavor,
};
pub use markdown::MarkdownScanner;
pub use paths::{GlobList, RegexList};
pub use progress::{Progress, VerifyProgress};
pub use reference::{
    DirStatus, FileInfo, FileStatus, LocationType, Position, Reference, RepoInfo,
};
pub use scan::{
    scan_repo, FileScanner, GatherScanError, ParseScanError, ScanErrorKind, ScanMode,
    ScannerRegistry,
};
pub use verify::{
    cancel_pair, check_copy_paste, verify_repo, CancelFlag, CancelHandle, CopyPasteCheckResult,
    ExternalProbe, HttpProbe, ProbeOutcome, RetryGate, VerifyConfig, VerifyError, VerifyMode,
    VerifyResult, VerifyResultEntry,
};
