//! Anchors and slug computation.
//!
//! An anchor is an addressable point inside a document: a header, an
//! explicit `<a name=…>` construct, or a bibliography entry. Header anchors
//! carry canonicalized slugs; the slug rules are the only place where
//! Markdown flavors differ, so new flavors plug in by adding a slug
//! function.

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::reference::Position;

/// The anchor slugging rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Flavor {
    #[default]
    GitHub,
    GitLab,
}

impl Flavor {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GitHub" | "github" => Some(Flavor::GitHub),
            "GitLab" | "gitlab" => Some(Flavor::GitLab),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Flavor::GitHub => "GitHub",
            Flavor::GitLab => "GitLab",
        }
    }

    /// Compute the canonical slug for a header title.
    pub fn slug(&self, text: &str) -> String {
        match self {
            // GitLab's slugger matches GitHub's for the character classes we
            // handle; the flavors differ only in constructs outside headers.
            Flavor::GitHub | Flavor::GitLab => sentinel_slug(text),
        }
    }

    /// Whether bibliography-style definitions produce anchors.
    pub fn emits_biblio_anchors(&self) -> bool {
        true
    }
}

impl Display for Flavor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker distinct from both `-` and every character the filter keeps.
const SENTINEL: char = '\u{1}';

/// The GitHub-style slug algorithm.
///
/// Lowercase once; turn `+` and whitespace into a sentinel, collapsing runs;
/// drop sentinels adjacent to `-`; turn the remaining sentinels into `-`;
/// finally keep only alphanumerics, `_` and `-`. Idempotent: a slug run
/// through the algorithm again comes out unchanged.
fn sentinel_slug(text: &str) -> String {
    let lowered = text.to_lowercase();

    let mut marked = String::with_capacity(lowered.len());
    for c in lowered.chars() {
        if c == '+' || c.is_whitespace() {
            if !marked.ends_with(SENTINEL) {
                marked.push(SENTINEL);
            }
        } else {
            marked.push(c);
        }
    }

    let chars: Vec<char> = marked.chars().collect();
    let mut slug = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == SENTINEL {
            let hyphen_before = i > 0 && chars[i - 1] == '-';
            let hyphen_after = chars.get(i + 1) == Some(&'-');
            if !hyphen_before && !hyphen_after {
                slug.push('-');
            }
        } else if c.is_alphanumeric() || c == '_' || c == '-' {
            slug.push(c);
        }
    }
    slug
}

/// What kind of construct an anchor came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorType {
    /// A Markdown heading of the given level (1..=6).
    Header { level: u8 },
    /// An explicit `<a name=…>` or `<a id=…>` construct.
    Handmade,
    /// A bibliography-style definition.
    Biblio,
}

impl Display for AnchorType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AnchorType::Header { level } => write!(f, "header (level {})", level),
            AnchorType::Handmade => f.write_str("handmade"),
            AnchorType::Biblio => f.write_str("biblio"),
        }
    }
}

/// An addressable point inside a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub kind: AnchorType,
    /// Canonical name: the (possibly suffixed) slug for headers, the literal
    /// name for handmade and biblio anchors.
    pub name: String,
    pub position: Position,
}

/// Assigns `-1`, `-2`, … suffixes to repeated slugs within one file.
///
/// The first occurrence keeps the bare slug; the k-th occurrence (k ≥ 2)
/// becomes `slug-<k-1>`, matching how hosts disambiguate duplicate headers.
#[derive(Debug, Default)]
pub struct DupSuffixer {
    seen: HashMap<String, usize>,
}

impl DupSuffixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disambiguate(&mut self, slug: String) -> String {
        let count = self.seen.entry(slug.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            slug
        } else {
            format!("{}-{}", slug, *count - 1)
        }
    }
}

/// Undo duplicate suffixing: `foo-2` → `Some("foo")`.
///
/// Returns `None` when the anchor carries no trailing `-<digits>` suffix.
pub fn strip_anchor_dup_no(anchor: &str) -> Option<&str> {
    let (bare, digits) = anchor.rsplit_once('-')?;
    if bare.is_empty() || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(bare)
}

/// Normalized similarity between two anchor names, in [0, 1].
///
/// Levenshtein distance scaled by the longer input; 1.0 means equal.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    let longest = a_len.max(b_len);
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            current[j + 1] = substitution.min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Fuzzy suggestions for an anchor that did not match.
///
/// Every candidate scoring at or above `threshold` is returned, best score
/// first, ties broken lexicographically.
pub fn suggest_anchors<'a, I>(target: &str, candidates: I, threshold: f64) -> Vec<String>
where
    I: IntoIterator<Item = &'a Anchor>,
{
    let mut scored: Vec<(f64, &str)> = candidates
        .into_iter()
        .map(|anchor| (similarity(target, &anchor.name), anchor.name.as_str()))
        .filter(|(score, _)| *score >= threshold)
        .collect();
    scored.sort_by(|(sa, na), (sb, nb)| {
        sb.partial_cmp(sa)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| na.cmp(nb))
    });
    scored.dedup_by(|(_, a), (_, b)| a == b);
    scored.into_iter().map(|(_, name)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gh(text: &str) -> String {
        Flavor::GitHub.slug(text)
    }

    #[test]
    fn slug_lowercases_and_hyphenates() {
        assert_eq!(gh("Hello World"), "hello-world");
        assert_eq!(gh("Chapter ONE"), "chapter-one");
    }

    #[test]
    fn slug_drops_punctuation() {
        assert_eq!(gh("Hello, World!"), "hello-world");
        assert_eq!(gh("What's new?"), "whats-new");
    }

    #[test]
    fn slug_collapses_space_runs() {
        assert_eq!(gh("Multiple   Spaces"), "multiple-spaces");
    }

    #[test]
    fn slug_preserves_existing_hyphens_without_doubling() {
        // Spaces adjacent to a hyphen are swallowed by it.
        assert_eq!(gh("pre - existing"), "pre-existing");
        assert_eq!(gh("_-  First -  - File"), "_-first--file");
    }

    #[test]
    fn slug_treats_plus_as_space() {
        assert_eq!(gh("a+b"), "a-b");
        assert_eq!(gh("a + b"), "a-b");
    }

    #[test]
    fn slug_keeps_underscores_and_unicode_letters() {
        assert_eq!(gh("snake_case here"), "snake_case-here");
        assert_eq!(gh("Überblick"), "überblick");
        assert_eq!(gh("日本語 見出し"), "日本語-見出し");
    }

    #[test]
    fn slug_is_idempotent() {
        for text in ["Hello, World!", "_-  First -  - File", "a + b", "Überblick 2"] {
            let once = gh(text);
            assert_eq!(gh(&once), once, "slug of {:?} is not idempotent", text);
        }
    }

    #[test]
    fn slug_character_classes() {
        let slug = gh("Some!@# Header $%^ with 1_2-3");
        assert!(slug
            .chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-'));
    }

    #[test]
    fn dup_suffixer_counts_per_slug() {
        let mut dups = DupSuffixer::new();
        assert_eq!(dups.disambiguate("intro".into()), "intro");
        assert_eq!(dups.disambiguate("intro".into()), "intro-1");
        assert_eq!(dups.disambiguate("intro".into()), "intro-2");
        assert_eq!(dups.disambiguate("other".into()), "other");
    }

    #[test]
    fn strip_anchor_dup_no_inverts_suffixing() {
        assert_eq!(strip_anchor_dup_no("intro-1"), Some("intro"));
        assert_eq!(strip_anchor_dup_no("intro-42"), Some("intro"));
        assert_eq!(strip_anchor_dup_no("intro"), None);
        assert_eq!(strip_anchor_dup_no("intro-"), None);
        assert_eq!(strip_anchor_dup_no("intro-x1"), None);
        assert_eq!(strip_anchor_dup_no("-1"), None);
    }

    #[test]
    fn similarity_is_normalized() {
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert!(similarity("abc", "xyz") < 0.01);
        let score = similarity("section-one", "section-two");
        assert!(score > 0.5 && score < 1.0);
    }

    #[test]
    fn suggest_anchors_filters_and_orders() {
        let anchors: Vec<Anchor> = ["section-two", "unrelated-name", "section-twos"]
            .iter()
            .map(|name| Anchor {
                kind: AnchorType::Header { level: 2 },
                name: (*name).into(),
                position: Position::new(1, 1),
            })
            .collect();

        let suggestions = suggest_anchors("section-one", &anchors, 0.5);
        assert_eq!(suggestions, vec!["section-two", "section-twos"]);
    }

    #[test]
    fn suggest_anchors_breaks_ties_lexicographically() {
        let anchors: Vec<Anchor> = ["abd", "abe"]
            .iter()
            .map(|name| Anchor {
                kind: AnchorType::Handmade,
                name: (*name).into(),
                position: Position::new(1, 1),
            })
            .collect();

        let suggestions = suggest_anchors("abc", &anchors, 0.5);
        assert_eq!(suggestions, vec!["abd", "abe"]);
    }
}
