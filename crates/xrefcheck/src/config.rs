//! Configuration schema.
//!
//! Config is YAML, looked up at `./.xrefcheck.yaml`, `./xrefcheck.yaml`,
//! `./.xrefcheck.yml` or `./xrefcheck.yml` (in that order) unless a path is
//! given explicitly; with no file at all, the built-in GitHub-flavor
//! defaults apply. CLI flags override individual fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Result, WrapErr};
use serde::{Deserialize, Serialize};
use xrefcheck_core::{Flavor, GlobList, RegexList, VerifyConfig, VerifyMode};

use crate::cli::CheckArgs;

/// Config file names probed under the repository root, in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    ".xrefcheck.yaml",
    "xrefcheck.yaml",
    ".xrefcheck.yml",
    "xrefcheck.yml",
];

/// Root of the YAML configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub exclusions: ExclusionConfig,
    pub networking: NetworkingConfig,
    pub scanners: ScannersConfig,
}

/// Which paths and URLs are exempt from scanning or verification.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExclusionConfig {
    /// Paths dropped from scanning entirely.
    pub ignore: Vec<String>,
    /// Files scanned for anchors but whose own references are not verified.
    pub ignore_refs_from: Vec<String>,
    /// Local targets accepted without checking.
    pub ignore_local_refs_to: Vec<String>,
    /// Regexes of external URLs accepted without probing.
    pub ignore_external_refs_to: Vec<String>,
    /// Paths treated as existing even when git does not know them.
    pub virtual_files: Vec<String>,
}

/// External probing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetworkingConfig {
    pub external_ref_check_timeout: ConfigDuration,
    pub ignore_auth_failures: bool,
    pub default_retry_after: ConfigDuration,
    pub max_retries: usize,
}

impl Default for NetworkingConfig {
    fn default() -> Self {
        Self {
            external_ref_check_timeout: ConfigDuration(Duration::from_secs(10)),
            ignore_auth_failures: false,
            default_retry_after: ConfigDuration(Duration::from_secs(30)),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScannersConfig {
    /// Threshold for fuzzy anchor suggestions, in [0, 1]; higher is stricter.
    pub anchor_similarity_threshold: f64,
    pub markdown: MarkdownConfig,
}

impl Default for ScannersConfig {
    fn default() -> Self {
        Self {
            anchor_similarity_threshold: 0.5,
            markdown: MarkdownConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkdownConfig {
    pub flavor: Flavor,
}

impl Config {
    /// Load an explicit configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("cannot read config file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .wrap_err_with(|| format!("malformed config file {}", path.display()))
    }

    /// Probe the default config paths under `root`.
    pub fn search(root: &Path) -> Result<Option<(PathBuf, Self)>> {
        for name in DEFAULT_CONFIG_PATHS {
            let path = root.join(name);
            if path.is_file() {
                let config = Self::load(&path)?;
                return Ok(Some((path, config)));
            }
        }
        Ok(None)
    }

    /// Explicit path, search, or built-in defaults, in that order.
    pub fn resolve(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => Ok(Self::search(root)?
                .map(|(_, config)| config)
                .unwrap_or_default()),
        }
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).wrap_err("cannot serialize configuration")
    }

    /// Fold CLI flags into the loaded configuration.
    pub fn apply_overrides(&mut self, args: &CheckArgs) {
        self.exclusions.ignore.extend(args.ignored.iter().cloned());
        self.exclusions
            .ignore_refs_from
            .extend(args.ignore_refs_from.iter().cloned());
        self.exclusions
            .ignore_local_refs_to
            .extend(args.ignore_local_refs_to.iter().cloned());
        self.exclusions
            .ignore_external_refs_to
            .extend(args.ignore_external_refs_to.iter().cloned());
        if let Some(timeout) = args.external_timeout {
            self.networking.external_ref_check_timeout = ConfigDuration(timeout);
        }
        if args.ignore_auth_failures {
            self.networking.ignore_auth_failures = true;
        }
        if args.no_ignore_auth_failures {
            self.networking.ignore_auth_failures = false;
        }
        if let Some(delay) = args.default_retry_after {
            self.networking.default_retry_after = ConfigDuration(delay);
        }
        if let Some(retries) = args.max_retries {
            self.networking.max_retries = retries;
        }
    }

    /// Compile into the core verifier's configuration. Pattern compilation
    /// failures surface here, before any scanning starts.
    pub fn to_verify_config(&self, root: &Path, mode: VerifyMode) -> Result<VerifyConfig> {
        let mut verify = VerifyConfig::for_root(root);
        verify.mode = mode;
        verify.flavor = self.scanners.markdown.flavor;
        verify.anchor_similarity_threshold = self.scanners.anchor_similarity_threshold;
        verify.external_ref_check_timeout = self.networking.external_ref_check_timeout.0;
        verify.ignore_auth_failures = self.networking.ignore_auth_failures;
        verify.default_retry_after = self.networking.default_retry_after.0;
        verify.max_retries = self.networking.max_retries;
        verify.ignore_refs_from = GlobList::compile(root, &self.exclusions.ignore_refs_from)?;
        verify.ignore_local_refs_to =
            GlobList::compile(root, &self.exclusions.ignore_local_refs_to)?;
        verify.ignore_external_refs_to =
            RegexList::compile(&self.exclusions.ignore_external_refs_to)?;
        verify.virtual_files = GlobList::compile(root, &self.exclusions.virtual_files)?;
        Ok(verify)
    }

    /// Globs dropped from scanning, compiled against the root.
    pub fn scan_ignore(&self, root: &Path) -> Result<GlobList> {
        GlobList::compile(root, &self.exclusions.ignore)
    }
}

/// A duration in config syntax: an integer followed by `s`, `m`, `h` or `ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDuration(pub Duration);

impl Serialize for ConfigDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(self.0))
    }
}

impl<'de> Deserialize<'de> for ConfigDuration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        parse_duration(&text)
            .map(ConfigDuration)
            .map_err(serde::de::Error::custom)
    }
}

/// Parse the duration grammar. Shared by the config loader and CLI flags.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    let text = text.trim();
    let (number, unit_ms) = if let Some(rest) = text.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = text.strip_suffix('s') {
        (rest, 1_000)
    } else if let Some(rest) = text.strip_suffix('m') {
        (rest, 60_000)
    } else if let Some(rest) = text.strip_suffix('h') {
        (rest, 3_600_000)
    } else {
        return Err(format!(
            "invalid duration {:?}: expected an integer with a unit (s, m, h or ms)",
            text
        ));
    };
    let value: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration {:?}: {:?} is not an integer", text, number))?;
    Ok(Duration::from_millis(value.saturating_mul(unit_ms)))
}

/// Render a duration in the most compact unit that stays exact.
pub fn format_duration(duration: Duration) -> String {
    let ms = duration.as_millis();
    if ms % 1_000 != 0 {
        return format!("{}ms", ms);
    }
    let seconds = ms / 1_000;
    if seconds != 0 && seconds % 3_600 == 0 {
        format!("{}h", seconds / 3_600)
    } else if seconds != 0 && seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{}s", seconds)
    }
}
