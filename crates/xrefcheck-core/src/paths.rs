//! Path canonicalization and pattern matching.
//!
//! Glob patterns are resolved relative to the repository root before
//! matching, so `docs/*.md` only matches files whose canonical path lies
//! under `root/docs`. Pattern compilation failures are configuration errors
//! and surface at load time.

use std::path::{Component, Path, PathBuf};

use eyre::{Result, WrapErr};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;

/// Resolve a path through the filesystem: absolute, symlinks resolved.
pub fn canonicalize(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path)
        .wrap_err_with(|| format!("cannot canonicalize path {}", path.display()))
}

/// Lexically normalize a path, resolving `.` and `..` components.
///
/// Unlike [`canonicalize`] this never touches the filesystem, so it works
/// for targets that may not exist (which is exactly what gets verified).
pub fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    normalized.push(Component::ParentDir);
                }
            }
            other => normalized.push(other),
        }
    }
    normalized
}

/// Join a link target onto a base directory and normalize the result.
pub fn join(base: &Path, relative: &str) -> PathBuf {
    normalize(&base.join(relative))
}

/// A set of glob patterns anchored at a repository root.
#[derive(Debug, Clone)]
pub struct GlobList {
    root: PathBuf,
    set: GlobSet,
    patterns: Vec<String>,
}

impl GlobList {
    /// Compile patterns; any malformed pattern is an error at load time.
    pub fn compile(root: &Path, patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .wrap_err_with(|| format!("invalid glob pattern {:?}", pattern))?;
            builder.add(glob);
            // A bare directory pattern also excludes everything beneath it.
            if !pattern.ends_with('*') {
                let recursive = format!("{}/**", pattern.trim_end_matches('/'));
                builder.add(
                    Glob::new(&recursive)
                        .wrap_err_with(|| format!("invalid glob pattern {:?}", pattern))?,
                );
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            set: builder.build().wrap_err("cannot build glob set")?,
            patterns: patterns.to_vec(),
        })
    }

    /// An empty list matching nothing.
    pub fn empty(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            set: GlobSet::empty(),
            patterns: Vec::new(),
        }
    }

    /// Whether `target` (canonical) matches any pattern, with patterns
    /// interpreted relative to the root.
    pub fn is_match(&self, target: &Path) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let relative = target.strip_prefix(&self.root).unwrap_or(target);
        self.set.is_match(relative)
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

/// A set of compiled regular expressions for external URL exclusion.
#[derive(Debug, Clone, Default)]
pub struct RegexList {
    regexes: Vec<Regex>,
}

impl RegexList {
    /// Compile extended-regex patterns, case-sensitive, at load time.
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let regexes = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .wrap_err_with(|| format!("invalid regex pattern {:?}", pattern))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { regexes })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regexes.iter().any(|regex| regex.is_match(text))
    }
}
