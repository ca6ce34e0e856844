//! References and the scanned repository model.
//!
//! A [`Reference`] is a link found in a document: a target (file path or
//! URL), an optional anchor, and the text it was written under. The scanner
//! produces one [`FileInfo`] per scannable file and assembles them into a
//! [`RepoInfo`], which the verifier then reads immutably.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use crate::anchor::Anchor;

/// Source location inside a document, 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// What kind of place a link points at, derived from the link text alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LocationType {
    /// Empty link; the reference targets the current document.
    Local,
    /// A path resolved against the referring file's directory.
    Relative,
    /// A path resolved against the repository root.
    Absolute,
    /// A URL with a `://` scheme separator near the front.
    External,
    /// Some other `scheme:` link such as `mailto:`; never verified.
    Other,
}

impl LocationType {
    /// Classify a link string.
    ///
    /// The classification is purely syntactic: an empty link is `Local`, a
    /// leading path separator means `Absolute`, a `://` within the first ten
    /// characters means `External`, any other `scheme:` prefix means
    /// `Other`, and everything else (including `./` and `../`) is
    /// `Relative`.
    pub fn of(link: &str) -> Self {
        if link.is_empty() {
            return LocationType::Local;
        }
        if link.starts_with('/') {
            return LocationType::Absolute;
        }
        let head: String = link.chars().take(10).collect();
        if head.contains("://") {
            return LocationType::External;
        }
        if let Some((scheme, _)) = link.split_once(':') {
            let mut chars = scheme.chars();
            let valid_scheme = chars
                .next()
                .map(|c| c.is_ascii_alphabetic())
                .unwrap_or(false)
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'));
            if valid_scheme {
                return LocationType::Other;
            }
        }
        LocationType::Relative
    }

    /// Whether this location is checked against the scanned repository tree.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            LocationType::Local | LocationType::Relative | LocationType::Absolute
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LocationType::Local => "local",
            LocationType::Relative => "relative",
            LocationType::Absolute => "absolute",
            LocationType::External => "external",
            LocationType::Other => "other",
        }
    }
}

impl Display for LocationType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A link gathered from a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// The text the link was written under.
    pub text: String,
    /// The link target without its anchor part.
    pub link: String,
    /// The anchor part of the target, URL-decoded, not slugged.
    pub anchor: Option<String>,
    /// Where the reference appears in the document.
    pub position: Position,
    /// Whether this reference participates in copy/paste detection.
    pub copy_paste_check: bool,
    /// Set by ignore annotations; ignored references are recorded for
    /// reporting but excluded from verification.
    pub ignored: bool,
}

impl Reference {
    pub fn location(&self) -> LocationType {
        LocationType::of(&self.link)
    }

    /// The full target as written, for display.
    pub fn full_target(&self) -> String {
        match &self.anchor {
            Some(anchor) => format!("{}#{}", self.link, anchor),
            None => self.link.clone(),
        }
    }
}

/// Everything gathered from one scannable file, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub references: Vec<Reference>,
    pub anchors: Vec<Anchor>,
}

/// Scan outcome for a single enumerated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// The file was parsed by a registered scanner.
    Scanned(FileInfo),
    /// No scanner is registered for the file's extension.
    NotScannable,
    /// The file has a recognized extension but is not tracked by the VCS.
    NotAddedToGit,
}

/// Tracking state of a directory, derived from the files beneath it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirStatus {
    Tracked,
    Untracked,
}

/// The immutable scan product: files with their parsed contents, directory
/// tracking state, and the canonical repository root.
#[derive(Debug, Clone, Default)]
pub struct RepoInfo {
    /// Keys are canonical absolute paths under `root`.
    pub files: BTreeMap<PathBuf, FileStatus>,
    pub directories: BTreeMap<PathBuf, DirStatus>,
    pub root: PathBuf,
}

impl RepoInfo {
    /// Look up a scanned file's contents.
    pub fn scanned(&self, path: &Path) -> Option<&FileInfo> {
        match self.files.get(path) {
            Some(FileStatus::Scanned(info)) => Some(info),
            _ => None,
        }
    }

    /// A path for display, relative to the root when possible.
    pub fn display_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_type_of_empty_link_is_local() {
        assert_eq!(LocationType::of(""), LocationType::Local);
    }

    #[test]
    fn location_type_of_leading_separator_is_absolute() {
        assert_eq!(LocationType::of("/docs/a.md"), LocationType::Absolute);
    }

    #[test]
    fn location_type_of_scheme_separator_is_external() {
        assert_eq!(LocationType::of("https://example.com"), LocationType::External);
        assert_eq!(LocationType::of("http://e"), LocationType::External);
        assert_eq!(LocationType::of("ftp://host/file"), LocationType::External);
    }

    #[test]
    fn location_type_of_late_scheme_separator_is_not_external() {
        // The `://` must fall within the first ten characters.
        assert_eq!(
            LocationType::of("verylongscheme://example.com"),
            LocationType::Other
        );
    }

    #[test]
    fn location_type_of_other_scheme_is_other() {
        assert_eq!(LocationType::of("mailto:hi@example.com"), LocationType::Other);
        assert_eq!(LocationType::of("tel:+1234567"), LocationType::Other);
    }

    #[test]
    fn location_type_of_plain_paths_is_relative() {
        assert_eq!(LocationType::of("./a.md"), LocationType::Relative);
        assert_eq!(LocationType::of("../a.md"), LocationType::Relative);
        assert_eq!(LocationType::of("docs/a.md"), LocationType::Relative);
        // A colon inside a path component is not a scheme.
        assert_eq!(LocationType::of("docs/a:b.md"), LocationType::Relative);
    }

    #[test]
    fn full_target_includes_anchor() {
        let reference = Reference {
            text: "go".into(),
            link: "./a.md".into(),
            anchor: Some("section".into()),
            position: Position::new(1, 1),
            copy_paste_check: true,
            ignored: false,
        };
        assert_eq!(reference.full_target(), "./a.md#section");
    }
}
