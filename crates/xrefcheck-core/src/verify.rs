//! Reference verification.
//!
//! Local references resolve against the scanned [`RepoInfo`]; external
//! references go through concurrent HTTP probes with per-domain rate-limit
//! discipline. The probe state machine is pure where it can be: status
//! classification and `Retry-After` parsing never touch the network, and
//! the HTTP transport hides behind [`ExternalProbe`] so tests can script
//! responses and drive the retry loop under a paused clock.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::anchor::{suggest_anchors, Anchor, Flavor};
use crate::paths::{join, GlobList, RegexList};
use crate::progress::VerifyProgress;
use crate::reference::{FileStatus, LocationType, Reference, RepoInfo};

/// Redirect chains longer than this fail with [`VerifyError::RedirectChainTooLong`].
pub const MAX_REDIRECTS: usize = 10;

/// Which verification families run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerifyMode {
    LocalOnly,
    ExternalOnly,
    #[default]
    Full,
}

impl VerifyMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "local" => Some(VerifyMode::LocalOnly),
            "external" => Some(VerifyMode::ExternalOnly),
            "full" => Some(VerifyMode::Full),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerifyMode::LocalOnly => "local",
            VerifyMode::ExternalOnly => "external",
            VerifyMode::Full => "full",
        }
    }

    pub fn checks_local(&self) -> bool {
        matches!(self, VerifyMode::LocalOnly | VerifyMode::Full)
    }

    pub fn checks_external(&self) -> bool {
        matches!(self, VerifyMode::ExternalOnly | VerifyMode::Full)
    }
}

/// Why a reference failed to verify.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum VerifyError {
    #[error("file does not exist: {}", path.display())]
    LocalFileDoesNotExist { path: PathBuf },
    #[error("anchor {anchor:?} does not exist in the target file")]
    AnchorDoesNotExist {
        anchor: String,
        suggestions: Vec<String>,
    },
    #[error("anchor reference is ambiguous: {} anchors match", matches.len())]
    AmbiguousAnchorRef { matches: Vec<Anchor> },
    #[error("external resource unavailable (HTTP {code} {message})")]
    ExternalResourceUnavailable { code: u16, message: String },
    #[error("external resource did not respond within the timeout")]
    ExternalResourceTimeout,
    #[error("network error: {0}")]
    ExternalResourceNetworkError(String),
    #[error("{0}")]
    ExternalResourceSomeError(String),
    #[error("too many redirects")]
    RedirectChainTooLong,
}

/// A verification failure tied to the reference that produced it.
#[derive(Debug, Clone)]
pub struct VerifyResultEntry {
    pub file: PathBuf,
    pub reference: Reference,
    pub error: VerifyError,
}

/// Two references in one file that share a target but not a name.
#[derive(Debug, Clone)]
pub struct CopyPasteCheckResult {
    pub file: PathBuf,
    pub original: Reference,
    pub copied: Reference,
}

/// Everything one verification run produced.
#[derive(Debug, Default)]
pub struct VerifyResult {
    entries: Vec<VerifyResultEntry>,
    copy_paste: Vec<CopyPasteCheckResult>,
    interrupted: bool,
}

impl VerifyResult {
    /// `None` iff no verification error was produced; otherwise the
    /// non-empty list, ordered by file then position.
    pub fn verify_errors(&self) -> Option<&[VerifyResultEntry]> {
        if self.entries.is_empty() {
            None
        } else {
            Some(&self.entries)
        }
    }

    pub fn copy_paste_results(&self) -> &[CopyPasteCheckResult] {
        &self.copy_paste
    }

    /// Whether the run was cut short by cancellation.
    pub fn interrupted(&self) -> bool {
        self.interrupted
    }
}

/// Knobs of one verification run.
#[derive(Debug, Clone)]
pub struct VerifyConfig {
    pub mode: VerifyMode,
    pub flavor: Flavor,
    pub anchor_similarity_threshold: f64,
    pub external_ref_check_timeout: Duration,
    pub ignore_auth_failures: bool,
    pub default_retry_after: Duration,
    pub max_retries: usize,
    pub max_concurrent_probes: usize,
    pub ignore_refs_from: GlobList,
    pub ignore_local_refs_to: GlobList,
    pub ignore_external_refs_to: RegexList,
    pub virtual_files: GlobList,
}

impl VerifyConfig {
    /// Defaults for a repository root: full mode, GitHub flavor, 10 s
    /// timeout, 30 s fallback retry delay, 3 retries.
    pub fn for_root(root: &Path) -> Self {
        Self {
            mode: VerifyMode::Full,
            flavor: Flavor::GitHub,
            anchor_similarity_threshold: 0.5,
            external_ref_check_timeout: Duration::from_secs(10),
            ignore_auth_failures: false,
            default_retry_after: Duration::from_secs(30),
            max_retries: 3,
            max_concurrent_probes: 16,
            ignore_refs_from: GlobList::empty(root),
            ignore_local_refs_to: GlobList::empty(root),
            ignore_external_refs_to: RegexList::default(),
            virtual_files: GlobList::empty(root),
        }
    }
}

/// Create a linked cancellation handle/flag pair.
pub fn cancel_pair() -> (CancelHandle, CancelFlag) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelFlag { rx })
}

/// The signalling end; typically wired to CTRL-C.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// The observing end, cloned into every probe task.
#[derive(Clone)]
pub struct CancelFlag {
    rx: watch::Receiver<bool>,
}

impl CancelFlag {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is signalled; never resolves otherwise.
    pub async fn cancelled(&mut self) {
        loop {
            if *self.rx.borrow() {
                return;
            }
            if self.rx.changed().await.is_err() {
                // The handle is gone and cancellation can no longer happen.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// What a single HTTP probe attempt observed.
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    Status {
        code: u16,
        reason: String,
        retry_after: Option<String>,
    },
    Timeout,
    TooManyRedirects,
    NetworkError(String),
    OtherError(String),
}

/// Transport seam for external checks.
#[async_trait]
pub trait ExternalProbe: Send + Sync {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome;
}

/// The production probe: HEAD with a GET fallback when the server rejects
/// the method, following at most [`MAX_REDIRECTS`] redirects.
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> eyre::Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(concat!("xrefcheck/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ExternalProbe for HttpProbe {
    async fn probe(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        match self.client.head(url).timeout(timeout).send().await {
            // Method not supported: retry as GET, without reading the body.
            Ok(response) if matches!(response.status().as_u16(), 405 | 501) => {
                match self.client.get(url).timeout(timeout).send().await {
                    Ok(response) => outcome_of(&response),
                    Err(error) => outcome_of_error(&error),
                }
            }
            Ok(response) => outcome_of(&response),
            Err(error) => outcome_of_error(&error),
        }
    }
}

fn outcome_of(response: &reqwest::Response) -> ProbeOutcome {
    let status = response.status();
    ProbeOutcome::Status {
        code: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("").to_string(),
        retry_after: response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
    }
}

fn outcome_of_error(error: &reqwest::Error) -> ProbeOutcome {
    if error.is_timeout() {
        ProbeOutcome::Timeout
    } else if error.is_redirect() {
        ProbeOutcome::TooManyRedirects
    } else if error.is_builder() || error.is_request() {
        ProbeOutcome::OtherError(error.to_string())
    } else {
        ProbeOutcome::NetworkError(error.to_string())
    }
}

/// Health classification of an HTTP status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StatusClass {
    Healthy,
    RateLimited,
    Unavailable,
}

pub(crate) fn classify_status(code: u16, ignore_auth_failures: bool) -> StatusClass {
    match code {
        200..=399 => StatusClass::Healthy,
        401 | 403 if ignore_auth_failures => StatusClass::Healthy,
        429 => StatusClass::RateLimited,
        _ => StatusClass::Unavailable,
    }
}

/// Parse a `Retry-After` header value: either delta-seconds or an HTTP
/// date. Unparseable values yield `None` and the configured default applies.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// Shared "this domain asked us to come back later" state.
///
/// Keyed by host so that parallel probes to one rate-limiting server defer
/// together instead of hammering it; writers keep the later wake time.
#[derive(Debug, Default)]
pub struct RetryGate {
    wake: Mutex<HashMap<String, Instant>>,
}

impl RetryGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn wake_time(&self, domain: &str) -> Option<Instant> {
        let map = self.wake.lock().expect("retry gate lock poisoned");
        map.get(domain).copied().filter(|at| *at > Instant::now())
    }

    fn push_wake(&self, domain: &str, at: Instant) {
        let mut map = self.wake.lock().expect("retry gate lock poisoned");
        let entry = map.entry(domain.to_string()).or_insert(at);
        if at > *entry {
            *entry = at;
        }
    }
}

fn domain_of(url: &str) -> Option<String> {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_string))
}

/// Drive one URL through the probe/retry state machine.
///
/// Returns `None` when cancelled mid-flight; the reference is then simply
/// not reported on.
async fn probe_with_retries(
    url: &str,
    config: &VerifyConfig,
    probe: &dyn ExternalProbe,
    gate: &RetryGate,
    progress: &VerifyProgress,
    cancel: &mut CancelFlag,
) -> Option<Result<(), VerifyError>> {
    let domain = domain_of(url);
    let mut retries = 0usize;
    let mut entered_retry = false;

    loop {
        if let Some(domain) = &domain {
            if let Some(wake) = gate.wake_time(domain) {
                tokio::select! {
                    _ = tokio::time::sleep_until(wake) => {}
                    _ = cancel.cancelled() => return None,
                }
            }
        }

        let outcome = tokio::select! {
            outcome = probe.probe(url, config.external_ref_check_timeout) => outcome,
            _ = cancel.cancelled() => return None,
        };

        match outcome {
            ProbeOutcome::Status {
                code,
                reason,
                retry_after,
            } => match classify_status(code, config.ignore_auth_failures) {
                StatusClass::Healthy => {
                    if entered_retry {
                        progress.external_fixable.tick();
                    }
                    return Some(Ok(()));
                }
                StatusClass::Unavailable => {
                    return Some(Err(VerifyError::ExternalResourceUnavailable {
                        code,
                        message: reason,
                    }));
                }
                StatusClass::RateLimited => {
                    if !entered_retry {
                        entered_retry = true;
                        progress
                            .external_fixable
                            .set_total(progress.external_fixable.total() + 1);
                    }
                    if retries >= config.max_retries {
                        return Some(Err(VerifyError::ExternalResourceUnavailable {
                            code,
                            message: reason,
                        }));
                    }
                    retries += 1;
                    let delay = retry_after
                        .as_deref()
                        .and_then(parse_retry_after)
                        .unwrap_or(config.default_retry_after);
                    match &domain {
                        Some(domain) => gate.push_wake(domain, Instant::now() + delay),
                        None => tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = cancel.cancelled() => return None,
                        },
                    }
                }
            },
            ProbeOutcome::Timeout => {
                return Some(Err(VerifyError::ExternalResourceTimeout));
            }
            ProbeOutcome::TooManyRedirects => {
                return Some(Err(VerifyError::RedirectChainTooLong));
            }
            ProbeOutcome::NetworkError(message) => {
                return Some(Err(VerifyError::ExternalResourceNetworkError(message)));
            }
            ProbeOutcome::OtherError(message) => {
                return Some(Err(VerifyError::ExternalResourceSomeError(message)));
            }
        }
    }
}

/// Check one local reference against the scanned tree.
fn check_local(
    repo: &RepoInfo,
    referrer: &Path,
    reference: &Reference,
    config: &VerifyConfig,
) -> Result<(), VerifyError> {
    let target = match reference.location() {
        LocationType::Local => referrer.to_path_buf(),
        LocationType::Relative => {
            let base = referrer.parent().unwrap_or(&repo.root);
            join(base, &reference.link)
        }
        LocationType::Absolute => join(&repo.root, reference.link.trim_start_matches('/')),
        LocationType::External | LocationType::Other => return Ok(()),
    };

    if config.ignore_local_refs_to.is_match(&target) {
        return Ok(());
    }

    let file_status = repo.files.get(&target);
    let exists = file_status.is_some()
        || repo.directories.contains_key(&target)
        || config.virtual_files.is_match(&target);
    if !exists {
        return Err(VerifyError::LocalFileDoesNotExist {
            path: repo.display_path(&target).to_path_buf(),
        });
    }

    let Some(anchor) = &reference.anchor else {
        return Ok(());
    };
    let Some(FileStatus::Scanned(info)) = file_status else {
        // Directory, virtual or unscannable target: nothing to check the
        // anchor against.
        return Ok(());
    };

    let matches: Vec<&Anchor> = info
        .anchors
        .iter()
        .filter(|candidate| candidate.name == *anchor)
        .collect();
    match matches.len() {
        1 => Ok(()),
        0 => Err(VerifyError::AnchorDoesNotExist {
            anchor: anchor.clone(),
            suggestions: suggest_anchors(
                anchor,
                &info.anchors,
                config.anchor_similarity_threshold,
            ),
        }),
        _ => Err(VerifyError::AmbiguousAnchorRef {
            matches: matches.into_iter().cloned().collect(),
        }),
    }
}

/// Find references in one file that share a target but whose names do not
/// fit it: the classic forgot-to-edit-the-copied-link mistake.
///
/// References are grouped by `(link, anchor)`. A name "fits" its target
/// when its compacted slug (lowercased, separators dropped) appears inside
/// the target's compacted slug; the first fitting reference is the original
/// and every non-fitting one in the group is flagged against it. Groups
/// with no fitting reference stay silent: there is nothing to anchor the
/// accusation to.
pub fn check_copy_paste(
    file: &Path,
    references: &[Reference],
    flavor: Flavor,
) -> Vec<CopyPasteCheckResult> {
    let mut order: Vec<(String, Option<String>)> = Vec::new();
    let mut groups: HashMap<(String, Option<String>), Vec<&Reference>> = HashMap::new();
    for reference in references.iter().filter(|r| r.copy_paste_check) {
        let key = (reference.link.clone(), reference.anchor.clone());
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(reference);
    }

    let mut results = Vec::new();
    for key in order {
        let group = &groups[&key];
        if group.len() < 2 {
            continue;
        }
        let mut target = compact_slug(flavor, &key.0);
        if let Some(anchor) = &key.1 {
            target.push_str(&compact_slug(flavor, anchor));
        }

        let (fitting, misfits): (Vec<&&Reference>, Vec<&&Reference>) = group
            .iter()
            .partition(|r| target.contains(&compact_slug(flavor, r.text.trim())));
        let Some(original) = fitting.first() else {
            continue;
        };
        for copied in misfits {
            results.push(CopyPasteCheckResult {
                file: file.to_path_buf(),
                original: (**original).clone(),
                copied: (*copied).clone(),
            });
        }
    }
    results
}

fn compact_slug(flavor: Flavor, text: &str) -> String {
    flavor
        .slug(text)
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Verify every reference of a scanned repository.
pub async fn verify_repo(
    repo: &RepoInfo,
    config: Arc<VerifyConfig>,
    probe: Arc<dyn ExternalProbe>,
    progress: Arc<VerifyProgress>,
    cancel: CancelFlag,
) -> VerifyResult {
    let mut result = VerifyResult::default();

    let mut local_checks: Vec<(&PathBuf, &Reference)> = Vec::new();
    let mut external: HashMap<String, Vec<(PathBuf, Reference)>> = HashMap::new();

    for (path, status) in &repo.files {
        let FileStatus::Scanned(info) = status else {
            continue;
        };
        result
            .copy_paste
            .extend(check_copy_paste(path, &info.references, config.flavor));

        if config.ignore_refs_from.is_match(path) {
            continue;
        }
        for reference in &info.references {
            if reference.ignored {
                continue;
            }
            match reference.location() {
                location if location.is_local() => {
                    if config.mode.checks_local() {
                        local_checks.push((path, reference));
                    }
                }
                LocationType::External => {
                    if !config.mode.checks_external() {
                        continue;
                    }
                    if config.ignore_external_refs_to.is_match(&reference.full_target()) {
                        continue;
                    }
                    external
                        .entry(reference.link.clone())
                        .or_default()
                        .push((path.clone(), reference.clone()));
                }
                // Other protocols (mailto: and friends) are accepted silently.
                _ => {}
            }
        }
    }

    progress.local.set_total(local_checks.len());
    progress
        .external
        .set_total(external.values().map(Vec::len).sum());

    for (path, reference) in local_checks {
        if cancel.is_cancelled() {
            result.interrupted = true;
            break;
        }
        match check_local(repo, path, reference, &config) {
            Ok(()) => progress.local.tick(),
            Err(error) => {
                progress.local.tick_error();
                result.entries.push(VerifyResultEntry {
                    file: path.clone(),
                    reference: reference.clone(),
                    error,
                });
            }
        }
    }

    let gate = Arc::new(RetryGate::new());
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent_probes.max(1)));
    let mut tasks: JoinSet<(Vec<(PathBuf, Reference)>, Option<Result<(), VerifyError>>)> =
        JoinSet::new();

    for (url, holders) in external {
        let config = Arc::clone(&config);
        let probe = Arc::clone(&probe);
        let gate = Arc::clone(&gate);
        let progress = Arc::clone(&progress);
        let semaphore = Arc::clone(&semaphore);
        let mut cancel = cancel.clone();
        tasks.spawn(async move {
            let permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.expect("semaphore is never closed"),
                _ = cancel.cancelled() => return (holders, None),
            };
            let outcome = probe_with_retries(
                &url,
                &config,
                probe.as_ref(),
                &gate,
                &progress,
                &mut cancel,
            )
            .await;
            drop(permit);
            (holders, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let Ok((holders, outcome)) = joined else {
            continue;
        };
        match outcome {
            None => result.interrupted = true,
            Some(Ok(())) => {
                for _ in &holders {
                    progress.external.tick();
                }
            }
            Some(Err(error)) => {
                for (file, reference) in holders {
                    progress.external.tick_error();
                    result.entries.push(VerifyResultEntry {
                        file,
                        reference,
                        error: error.clone(),
                    });
                }
            }
        }
    }

    result.entries.sort_by(|a, b| {
        a.file
            .cmp(&b.file)
            .then(a.reference.position.cmp(&b.reference.position))
    });
    result
}
