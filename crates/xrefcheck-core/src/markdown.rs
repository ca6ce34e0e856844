//! Markdown scanner: turns a document into references and anchors.
//!
//! Built on the pulldown-cmark event stream with byte offsets, so every
//! gathered item carries a precise source position. The scanner never fails:
//! malformed ignore annotations become accumulated [`ParseScanError`]s and
//! the partial [`FileInfo`] is still returned.
//!
//! # Ignore annotations
//!
//! HTML comments of the form `<!-- xrefcheck: … -->` steer the scanner:
//!
//! - `ignore link` — the next link is recorded but never verified;
//! - `ignore paragraph` — all links of the next paragraph are ignored;
//! - `ignore all` — the whole file's links are ignored; only valid at the
//!   top of the file (other comments may precede it).

use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::anchor::{Anchor, AnchorType, DupSuffixer, Flavor};
use crate::reference::{FileInfo, Position, Reference};
use crate::scan::{FileScanner, ParseScanError, ScanErrorKind};

static COMMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--(.*?)-->").expect("static regex"));

static HANDMADE_ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a\s[^>]*?(?:name|id)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("static regex")
});

/// The Markdown implementation of [`FileScanner`].
#[derive(Debug, Clone, Copy)]
pub struct MarkdownScanner {
    flavor: Flavor,
}

impl MarkdownScanner {
    pub fn new(flavor: Flavor) -> Self {
        Self { flavor }
    }

    pub fn flavor(&self) -> Flavor {
        self.flavor
    }
}

impl FileScanner for MarkdownScanner {
    fn extensions(&self) -> &[&str] {
        &["md", "markdown"]
    }

    fn scan(&self, content: &str) -> (FileInfo, Vec<ParseScanError>) {
        ScanState::new(self.flavor, content).run()
    }
}

/// Byte offset → 1-indexed line/column lookup.
struct LineIndex {
    line_starts: Vec<usize>,
}

impl LineIndex {
    fn new(text: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    fn position(&self, text: &str, offset: usize) -> Position {
        let offset = offset.min(text.len());
        let line = self.line_starts.partition_point(|&start| start <= offset);
        let line_start = self.line_starts[line - 1];
        let column = text[line_start..offset].chars().count() + 1;
        Position::new(line, column)
    }
}

/// An annotation waiting for the node it applies to.
#[derive(Debug, Clone, Copy)]
enum Pending {
    IgnoreLink(Position),
    IgnoreParagraph(Position),
}

/// A link or image whose inline content is still being collected.
struct LinkBuild {
    link: String,
    anchor: Option<String>,
    position: Position,
    text: String,
    ignored: bool,
}

struct HeadingBuild {
    level: u8,
    position: Position,
    text: String,
}

struct ScanState<'a> {
    flavor: Flavor,
    content: &'a str,
    lines: LineIndex,
    info: FileInfo,
    errors: Vec<ParseScanError>,
    dups: DupSuffixer,
    pending: Option<Pending>,
    ignore_all: bool,
    in_ignored_paragraph: bool,
    /// False until the first non-comment construct; `ignore all` is only
    /// valid while this is still false.
    saw_content: bool,
    link_stack: Vec<LinkBuild>,
    heading: Option<HeadingBuild>,
}

impl<'a> ScanState<'a> {
    fn new(flavor: Flavor, content: &'a str) -> Self {
        Self {
            flavor,
            content,
            lines: LineIndex::new(content),
            info: FileInfo::default(),
            errors: Vec::new(),
            dups: DupSuffixer::new(),
            pending: None,
            ignore_all: false,
            in_ignored_paragraph: false,
            saw_content: false,
            link_stack: Vec::new(),
            heading: None,
        }
    }

    fn run(mut self) -> (FileInfo, Vec<ParseScanError>) {
        let options = Options::ENABLE_FOOTNOTES
            | Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS;
        let parser = Parser::new_ext(self.content, options);

        for (event, range) in parser.into_offset_iter() {
            let position = self.lines.position(self.content, range.start);
            match event {
                Event::Start(Tag::Paragraph) => {
                    if let Some(Pending::IgnoreParagraph(_)) = self.pending {
                        self.pending = None;
                        self.in_ignored_paragraph = true;
                    }
                    self.saw_content = true;
                }
                Event::End(TagEnd::Paragraph) => {
                    self.in_ignored_paragraph = false;
                    // An ignore-link annotation that reached the end of its
                    // paragraph has nothing left to apply to.
                    if let Some(Pending::IgnoreLink(at)) = self.pending {
                        self.pending = None;
                        self.errors.push(ParseScanError::new(
                            at,
                            ScanErrorKind::ExpectedLinkAfterIgnoreLink,
                        ));
                    }
                }
                Event::Start(Tag::Heading { level, .. }) => {
                    self.flush_pending("heading");
                    self.saw_content = true;
                    self.heading = Some(HeadingBuild {
                        level: level as u8,
                        position,
                        text: String::new(),
                    });
                }
                Event::End(TagEnd::Heading(_)) => self.finish_heading(),
                Event::Start(Tag::Link { dest_url, .. }) => {
                    self.start_link(&dest_url, position);
                }
                Event::Start(Tag::Image { dest_url, .. }) => {
                    self.start_link(&dest_url, position);
                }
                Event::End(TagEnd::Link) | Event::End(TagEnd::Image) => self.finish_link(),
                Event::Start(Tag::FootnoteDefinition(label)) => {
                    self.flush_pending("footnote definition");
                    self.saw_content = true;
                    if self.flavor.emits_biblio_anchors() {
                        self.info.anchors.push(Anchor {
                            kind: AnchorType::Biblio,
                            name: label.to_string(),
                            position,
                        });
                    }
                }
                Event::Start(Tag::HtmlBlock) | Event::End(TagEnd::HtmlBlock) => {
                    // Transparent wrapper; the Html events inside decide.
                }
                Event::Start(tag) => {
                    self.flush_pending(block_name(&tag));
                    self.saw_content = true;
                }
                Event::End(_) => {}
                Event::Text(text) => self.handle_text(&text),
                Event::Code(code) => {
                    self.append_text(&code);
                    self.saw_content = true;
                }
                Event::Html(html) | Event::InlineHtml(html) => {
                    self.handle_html(&html, range.start);
                }
                Event::SoftBreak | Event::HardBreak => self.append_text(" "),
                Event::Rule => {
                    self.flush_pending("thematic break");
                    self.saw_content = true;
                }
                Event::FootnoteReference(_) | Event::TaskListMarker(_) => {
                    self.saw_content = true;
                }
                _ => {}
            }
        }

        self.flush_pending("end of file");
        (self.info, self.errors)
    }

    /// Resolve an outstanding annotation that was not followed by the node
    /// it expects.
    fn flush_pending(&mut self, found: &str) {
        match self.pending.take() {
            None => {}
            Some(Pending::IgnoreLink(at)) => self.errors.push(ParseScanError::new(
                at,
                ScanErrorKind::ExpectedLinkAfterIgnoreLink,
            )),
            Some(Pending::IgnoreParagraph(at)) => self.errors.push(ParseScanError::new(
                at,
                ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph {
                    found: found.to_string(),
                },
            )),
        }
    }

    fn start_link(&mut self, dest: &str, position: Position) {
        let mut ignored = self.ignore_all || self.in_ignored_paragraph;
        if let Some(Pending::IgnoreLink(_)) = self.pending {
            self.pending = None;
            ignored = true;
        }
        self.saw_content = true;

        let (link, anchor) = match dest.split_once('#') {
            Some((link, anchor)) => (link.to_string(), Some(percent_decode(anchor))),
            None => (dest.to_string(), None),
        };
        self.link_stack.push(LinkBuild {
            link,
            anchor,
            position,
            text: String::new(),
            ignored,
        });
    }

    fn finish_link(&mut self) {
        if let Some(build) = self.link_stack.pop() {
            self.info.references.push(Reference {
                text: build.text,
                link: build.link,
                anchor: build.anchor,
                position: build.position,
                copy_paste_check: !build.ignored,
                ignored: build.ignored,
            });
        }
    }

    fn finish_heading(&mut self) {
        if let Some(heading) = self.heading.take() {
            let slug = self.flavor.slug(&heading.text);
            let name = self.dups.disambiguate(slug);
            self.info.anchors.push(Anchor {
                kind: AnchorType::Header {
                    level: heading.level,
                },
                name,
                position: heading.position,
            });
        }
    }

    fn handle_text(&mut self, text: &str) {
        let inside_construct = self.heading.is_some() || !self.link_stack.is_empty();
        self.append_text(text);
        if !text.trim().is_empty() {
            self.saw_content = true;
            if !inside_construct {
                self.flush_pending("text");
            }
        }
    }

    fn append_text(&mut self, text: &str) {
        if let Some(heading) = &mut self.heading {
            heading.text.push_str(text);
        }
        for build in &mut self.link_stack {
            build.text.push_str(text);
        }
    }

    /// Process a raw HTML chunk: annotations, handmade anchors, and plain
    /// markup all look like HTML events to the parser.
    fn handle_html(&mut self, html: &str, offset: usize) {
        let mut comment_spans: Vec<(usize, usize)> = Vec::new();

        for captures in COMMENT_RE.captures_iter(html) {
            let whole = captures.get(0).expect("group 0 always present");
            comment_spans.push((whole.start(), whole.end()));
            let inner = captures.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            if let Some(option) = inner.strip_prefix("xrefcheck:") {
                let at = self.lines.position(self.content, offset + whole.start());
                self.apply_annotation(option.trim(), at);
            }
        }

        // Anything outside comments is genuine markup.
        let mut plain = String::new();
        let mut cursor = 0;
        for &(start, end) in &comment_spans {
            plain.push_str(&html[cursor..start]);
            cursor = end;
        }
        plain.push_str(&html[cursor..]);
        if plain.trim().is_empty() {
            return;
        }

        self.saw_content = true;
        let mut found_anchor = false;
        for captures in HANDMADE_ANCHOR_RE.captures_iter(html) {
            let whole = captures.get(0).expect("group 0 always present");
            let in_comment = comment_spans
                .iter()
                .any(|&(start, end)| whole.start() >= start && whole.end() <= end);
            if in_comment {
                continue;
            }
            let name = captures
                .get(1)
                .or_else(|| captures.get(2))
                .map(|m| m.as_str())
                .unwrap_or("");
            self.info.anchors.push(Anchor {
                kind: AnchorType::Handmade,
                name: name.to_string(),
                position: self.lines.position(self.content, offset + whole.start()),
            });
            found_anchor = true;
        }

        // A handmade anchor is an acceptable target for a pending ignore
        // annotation's error message; other markup is just "html".
        let found = if found_anchor { "anchor" } else { "html" };
        self.flush_pending(found);
    }

    fn apply_annotation(&mut self, option: &str, at: Position) {
        match option {
            "ignore link" => {
                self.flush_pending("annotation");
                self.pending = Some(Pending::IgnoreLink(at));
            }
            "ignore paragraph" => {
                self.flush_pending("annotation");
                self.pending = Some(Pending::IgnoreParagraph(at));
            }
            "ignore all" => {
                if self.saw_content {
                    self.errors
                        .push(ParseScanError::new(at, ScanErrorKind::IgnoreAllMisplaced));
                } else {
                    self.ignore_all = true;
                }
            }
            other => self.errors.push(ParseScanError::new(
                at,
                ScanErrorKind::UnrecognisedIgnoreOption {
                    option: other.to_string(),
                },
            )),
        }
    }
}

fn block_name(tag: &Tag<'_>) -> &'static str {
    match tag {
        Tag::Paragraph => "paragraph",
        Tag::Heading { .. } => "heading",
        Tag::CodeBlock(_) => "code block",
        Tag::List(_) => "list",
        Tag::Item => "list item",
        Tag::BlockQuote(_) => "block quote",
        Tag::Table(_) => "table",
        Tag::FootnoteDefinition(_) => "footnote definition",
        _ => "block",
    }
}

/// Decode `%XX` escapes; invalid escapes pass through untouched.
fn percent_decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2]));
            if let (Some(hi), Some(lo)) = hex {
                out.push(hi * 16 + lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::LocationType;

    fn scan(content: &str) -> (FileInfo, Vec<ParseScanError>) {
        MarkdownScanner::new(Flavor::GitHub).scan(content)
    }

    fn anchor_names(info: &FileInfo) -> Vec<&str> {
        info.anchors.iter().map(|a| a.name.as_str()).collect()
    }

    #[test]
    fn headers_become_slugged_anchors() {
        let (info, errors) = scan("# Top Level\n\n## Section One\n\n### Deep, nested!\n");
        assert!(errors.is_empty());
        assert_eq!(
            anchor_names(&info),
            vec!["top-level", "section-one", "deep-nested"]
        );
        assert_eq!(info.anchors[0].kind, AnchorType::Header { level: 1 });
        assert_eq!(info.anchors[2].kind, AnchorType::Header { level: 3 });
    }

    #[test]
    fn setext_headers_are_recognized() {
        let (info, _) = scan("Title Here\n==========\n\nSub Title\n---------\n");
        assert_eq!(anchor_names(&info), vec!["title-here", "sub-title"]);
        assert_eq!(info.anchors[0].kind, AnchorType::Header { level: 1 });
        assert_eq!(info.anchors[1].kind, AnchorType::Header { level: 2 });
    }

    #[test]
    fn duplicate_headers_get_numbered_suffixes() {
        let (info, _) = scan("# Intro\n\n# Intro\n\n# Intro\n");
        assert_eq!(anchor_names(&info), vec!["intro", "intro-1", "intro-2"]);
    }

    #[test]
    fn duplicate_headers_differing_in_case_share_a_slug() {
        let (info, _) = scan("# Intro\n\n# INTRO\n");
        assert_eq!(anchor_names(&info), vec!["intro", "intro-1"]);
    }

    #[test]
    fn heading_text_includes_inline_code_and_links() {
        let (info, _) = scan("## Using `foo` with [bar](./bar.md)\n");
        assert_eq!(info.anchors[0].name, "using-foo-with-bar");
        // The link inside the heading is still gathered.
        assert_eq!(info.references.len(), 1);
        assert_eq!(info.references[0].text, "bar");
    }

    #[test]
    fn inline_link_splits_anchor_at_hash() {
        let (info, _) = scan("[go](./a.md#section-one)\n");
        let reference = &info.references[0];
        assert_eq!(reference.link, "./a.md");
        assert_eq!(reference.anchor.as_deref(), Some("section-one"));
        assert_eq!(reference.location(), LocationType::Relative);
    }

    #[test]
    fn link_anchor_is_percent_decoded_not_slugged() {
        let (info, _) = scan("[go](./a.md#%D0%BF%D1%80%D0%B8%D0%B2%D0%B5%D1%82)\n");
        assert_eq!(info.references[0].anchor.as_deref(), Some("привет"));

        let (info, _) = scan("[go](#Some%20Anchor)\n");
        assert_eq!(info.references[0].anchor.as_deref(), Some("Some Anchor"));
        assert_eq!(info.references[0].location(), LocationType::Local);
    }

    #[test]
    fn reference_style_links_resolve_via_definitions() {
        let (info, _) = scan("[text][label]\n\n[label]: ./target.md\n");
        assert_eq!(info.references.len(), 1);
        assert_eq!(info.references[0].link, "./target.md");
        assert_eq!(info.references[0].text, "text");
    }

    #[test]
    fn autolinks_are_gathered() {
        let (info, _) = scan("See <https://example.com/page> for details.\n");
        assert_eq!(info.references.len(), 1);
        assert_eq!(info.references[0].link, "https://example.com/page");
        assert_eq!(info.references[0].location(), LocationType::External);
    }

    #[test]
    fn images_are_gathered_as_references() {
        let (info, _) = scan("![diagram](./img/flow.png)\n");
        assert_eq!(info.references.len(), 1);
        assert_eq!(info.references[0].link, "./img/flow.png");
        assert_eq!(info.references[0].text, "diagram");
    }

    #[test]
    fn handmade_anchors_are_recognized() {
        let (info, _) = scan("<a name=\"target-one\"></a>\n\ntext <a id='target-two'></a>\n");
        assert_eq!(anchor_names(&info), vec!["target-one", "target-two"]);
        assert!(info.anchors.iter().all(|a| a.kind == AnchorType::Handmade));
    }

    #[test]
    fn footnote_definitions_become_biblio_anchors() {
        let (info, _) = scan("Text with a note[^note].\n\n[^note]: The note body.\n");
        let biblio: Vec<_> = info
            .anchors
            .iter()
            .filter(|a| a.kind == AnchorType::Biblio)
            .collect();
        assert_eq!(biblio.len(), 1);
        assert_eq!(biblio[0].name, "note");
    }

    #[test]
    fn positions_are_one_indexed_line_and_column() {
        let (info, _) = scan("# First\n\nSee [go](./a.md) now.\n");
        assert_eq!(info.anchors[0].position, Position::new(1, 1));
        assert_eq!(info.references[0].position, Position::new(3, 5));
    }

    #[test]
    fn ignore_link_excludes_the_next_link() {
        let (info, errors) =
            scan("<!-- xrefcheck: ignore link -->\n[skipped](./missing.md)\n\n[kept](./a.md)\n");
        assert!(errors.is_empty());
        assert_eq!(info.references.len(), 2);
        assert!(info.references[0].ignored);
        assert!(!info.references[0].copy_paste_check);
        assert!(!info.references[1].ignored);
    }

    #[test]
    fn ignore_link_inline_applies_within_paragraph() {
        let (info, errors) = scan("before <!-- xrefcheck: ignore link --> [x](./gone.md) after\n");
        assert!(errors.is_empty());
        assert!(info.references[0].ignored);
    }

    #[test]
    fn ignore_link_without_a_link_is_an_error() {
        let (_, errors) = scan("<!-- xrefcheck: ignore link -->\n\nJust a paragraph.\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ScanErrorKind::ExpectedLinkAfterIgnoreLink);
        assert_eq!(errors[0].position.line, 1);
    }

    #[test]
    fn ignore_paragraph_excludes_all_links_inside() {
        let (info, errors) = scan(
            "<!-- xrefcheck: ignore paragraph -->\n\
             One [a](./a.md) and [b](./b.md).\n\n\
             Next [c](./c.md).\n",
        );
        assert!(errors.is_empty());
        assert_eq!(info.references.len(), 3);
        assert!(info.references[0].ignored);
        assert!(info.references[1].ignored);
        assert!(!info.references[2].ignored);
    }

    #[test]
    fn ignore_paragraph_before_heading_is_an_error() {
        let (_, errors) = scan("<!-- xrefcheck: ignore paragraph -->\n# Heading\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind,
            ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph {
                found: "heading".into()
            }
        );
    }

    #[test]
    fn ignore_paragraph_at_end_of_file_is_an_error() {
        let (_, errors) = scan("Some text.\n\n<!-- xrefcheck: ignore paragraph -->\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind,
            ScanErrorKind::ExpectedParagraphAfterIgnoreParagraph {
                found: "end of file".into()
            }
        );
    }

    #[test]
    fn ignore_all_at_top_ignores_every_reference() {
        let (info, errors) = scan(
            "<!-- a leading remark -->\n<!-- xrefcheck: ignore all -->\n\n\
             # Title\n\n[a](./a.md) and [b](./b.md)\n",
        );
        assert!(errors.is_empty());
        assert_eq!(info.references.len(), 2);
        assert!(info.references.iter().all(|r| r.ignored));
        // Anchors are still gathered; other files may link here.
        assert_eq!(anchor_names(&info), vec!["title"]);
    }

    #[test]
    fn ignore_all_after_content_is_an_error() {
        let (info, errors) = scan("# Title\n\n<!-- xrefcheck: ignore all -->\n\n[a](./a.md)\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ScanErrorKind::IgnoreAllMisplaced);
        assert!(!info.references[0].ignored);
    }

    #[test]
    fn unknown_annotation_option_is_an_error() {
        let (_, errors) = scan("<!-- xrefcheck: frobnicate the links -->\n");
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].kind,
            ScanErrorKind::UnrecognisedIgnoreOption {
                option: "frobnicate the links".into()
            }
        );
    }

    #[test]
    fn plain_comments_are_not_annotations() {
        let (info, errors) = scan("<!-- regular comment -->\n\n[a](./a.md)\n");
        assert!(errors.is_empty());
        assert!(!info.references[0].ignored);
    }

    #[test]
    fn errors_accumulate_without_aborting() {
        let (info, errors) = scan(
            "<!-- xrefcheck: bogus -->\n\n\
             <!-- xrefcheck: ignore link -->\n\n# Not a link\n\n\
             [still gathered](./a.md)\n",
        );
        assert_eq!(errors.len(), 2);
        assert_eq!(info.references.len(), 1);
        assert!(!info.references[0].ignored);
    }

    #[test]
    fn percent_decode_handles_invalid_escapes() {
        assert_eq!(percent_decode("a%2Gb"), "a%2Gb");
        assert_eq!(percent_decode("trailing%2"), "trailing%2");
        assert_eq!(percent_decode("%41"), "A");
    }
}
