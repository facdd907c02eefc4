/*
 * locator.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Locating citation markers and bibliography insertion points in page text.
 */

//! Citation marker scanning.
//!
//! Matching is purely syntactic. Two surface syntaxes are supported:
//!
//! ```text
//! bracketed:  [@key]  [see @key, p. 4]  [@a; -@b, chap. 2]
//! bare:       @key
//! ```
//!
//! Code spans, fenced code blocks, URLs and backslash-escaped text are
//! skipped in both syntaxes. Bibliography insertion commands are literal strings and are
//! located separately.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::citation::{Citation, CitationMarker, InsertionKind, InsertionPoint, PageScan};
use crate::config::{CitationSyntax, CitedocConfig};

/// A `[...]` group on one line with at least one `@` inside.
static BRACKET_GROUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]\n]*@[^\[\]\n]*)\]").expect("Invalid regex pattern for bracket group")
});

/// One `;`-separated part of a bracket group: `prefix -@key, suffix`.
///
/// The prefix must be separated from `@` by whitespace, which also keeps
/// e-mail addresses and URLs from matching. Keys end on a word character,
/// so a trailing `.` or `:` is left to the suffix.
static CITATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?P<prefix>[^@]*?)\s+)?(?P<suppress>-)?@(?P<key>\w(?:[\w:.+/-]*\w)?)(?P<rest>.*)$")
        .expect("Invalid regex pattern for citation part")
});

static BARE_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"@(?P<key>\w(?:[\w:.+/-]*\w)?)").expect("Invalid regex pattern for bare citation")
});

static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"``[^\n]*?``|`[^`\n]+`").expect("Invalid regex pattern for inline code")
});

/// Autolinks (`<https://...>`), bare `scheme://` URLs and the target of an
/// inline link (`](...)`).
static URL_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[A-Za-z][A-Za-z0-9+.-]*:[^<>\s]*>|\b[A-Za-z][A-Za-z0-9+.-]*://[^\s<>]+|\]\([^)\s]*\)")
        .expect("Invalid regex pattern for URL text")
});

/// Locator settings, usually taken from [`CitedocConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorOptions {
    pub syntax: CitationSyntax,
    pub bibliography_command: String,
    pub full_bibliography_command: String,
    pub insert_bibliography_by_default: bool,
}

impl From<&CitedocConfig> for LocatorOptions {
    fn from(config: &CitedocConfig) -> Self {
        Self {
            syntax: config.citation_syntax,
            bibliography_command: config.bibliography_command.clone(),
            full_bibliography_command: config.full_bibliography_command.clone(),
            insert_bibliography_by_default: config.insert_bibliography_by_default,
        }
    }
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self::from(&CitedocConfig::default())
    }
}

/// Locate markers and insertion points in one page.
pub fn scan_page(text: &str, options: &LocatorOptions) -> PageScan {
    let skipped = skipped_regions(text);
    PageScan {
        markers: markers_outside(text, options.syntax, &skipped),
        insertions: insertions_outside(text, options, &skipped),
    }
}

/// Every citation marker in `text`, in document order.
pub fn locate_markers(text: &str, syntax: CitationSyntax) -> Vec<CitationMarker> {
    markers_outside(text, syntax, &skipped_regions(text))
}

/// Every bibliography insertion point in `text`, in document order, plus the
/// implicit end-of-page point when enabled and no explicit short-bibliography
/// command is present.
pub fn locate_insertion_points(text: &str, options: &LocatorOptions) -> Vec<InsertionPoint> {
    insertions_outside(text, options, &skipped_regions(text))
}

fn markers_outside(
    text: &str,
    syntax: CitationSyntax,
    code: &[Range<usize>],
) -> Vec<CitationMarker> {
    match syntax {
        CitationSyntax::Bracketed => bracketed_markers(text, code),
        CitationSyntax::Bare => bare_markers(text, code),
    }
}

fn bracketed_markers(text: &str, code: &[Range<usize>]) -> Vec<CitationMarker> {
    let mut markers = Vec::new();
    for caps in BRACKET_GROUP.captures_iter(text) {
        let Some(group) = caps.get(0) else { continue };
        if in_regions(code, group.start())
            || text[..group.start()].ends_with('\\')
            || text[group.end()..].starts_with('(')
        {
            continue;
        }

        let citations: Vec<Citation> = caps[1].split(';').filter_map(parse_part).collect();
        if citations.is_empty() {
            continue;
        }
        markers.push(CitationMarker {
            literal: group.as_str().to_string(),
            citations,
            span: group.range(),
        });
    }
    markers
}

fn parse_part(part: &str) -> Option<Citation> {
    let caps = CITATION_PART.captures(part.trim())?;
    let prefix = caps.name("prefix").map_or("", |m| m.as_str().trim());
    let rest = caps.name("rest").map_or("", |m| m.as_str().trim());
    let suffix = rest.strip_prefix(',').unwrap_or(rest).trim();

    Some(Citation {
        key: caps["key"].to_string(),
        prefix: prefix.to_string(),
        suffix: suffix.to_string(),
        suppress_author: caps.name("suppress").is_some(),
    })
}

fn bare_markers(text: &str, code: &[Range<usize>]) -> Vec<CitationMarker> {
    let mut markers = Vec::new();
    for caps in BARE_CITATION.captures_iter(text) {
        let Some(found) = caps.get(0) else { continue };
        let preceded_by_word = text[..found.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '@' | '/' | '\\'));
        if preceded_by_word || in_regions(code, found.start()) {
            continue;
        }
        markers.push(CitationMarker {
            literal: found.as_str().to_string(),
            citations: vec![Citation::new(&caps["key"])],
            span: found.range(),
        });
    }
    markers
}

fn insertions_outside(
    text: &str,
    options: &LocatorOptions,
    code: &[Range<usize>],
) -> Vec<InsertionPoint> {
    let mut points: Vec<InsertionPoint> = Vec::new();

    // The full command first, so a short command that overlaps it (or is a
    // prefix of it) is not reported twice.
    let commands = [
        (
            InsertionKind::FullBibliography,
            options.full_bibliography_command.as_str(),
        ),
        (
            InsertionKind::Bibliography,
            options.bibliography_command.as_str(),
        ),
    ];
    for (kind, command) in commands {
        if command.is_empty() {
            continue;
        }
        for (start, found) in text.match_indices(command) {
            let span = start..start + found.len();
            let overlaps = points
                .iter()
                .any(|p| p.span.start < span.end && span.start < p.span.end);
            if overlaps || in_regions(code, start) {
                continue;
            }
            points.push(InsertionPoint {
                kind,
                span,
                implicit: false,
            });
        }
    }
    points.sort_by_key(|p| p.span.start);

    let has_short = points
        .iter()
        .any(|p| p.kind == InsertionKind::Bibliography);
    if options.insert_bibliography_by_default && !has_short {
        points.push(InsertionPoint {
            kind: InsertionKind::Bibliography,
            span: text.len()..text.len(),
            implicit: true,
        });
    }
    points
}

/// Byte ranges no marker or command may start in: code, then URLs outside
/// code.
fn skipped_regions(text: &str) -> Vec<Range<usize>> {
    let mut regions = code_regions(text);
    let urls: Vec<Range<usize>> = URL_TEXT
        .find_iter(text)
        .map(|m| m.range())
        .filter(|r| !in_regions(&regions, r.start))
        .collect();
    regions.extend(urls);
    regions
}

/// Byte ranges of fenced code blocks and inline code spans.
fn code_regions(text: &str) -> Vec<Range<usize>> {
    let mut regions = Vec::new();

    let mut open: Option<(char, usize, usize)> = None;
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let trimmed = line.trim_start();
        match (open, fence_run(trimmed)) {
            (None, Some((ch, len))) => open = Some((ch, len, offset)),
            (Some((ch, len, start)), Some((c, l)))
                if c == ch && l >= len && trimmed[l..].trim().is_empty() =>
            {
                regions.push(start..offset + line.len());
                open = None;
            }
            _ => {}
        }
        offset += line.len();
    }
    // An unclosed fence runs to the end of the page.
    if let Some((_, _, start)) = open {
        regions.push(start..text.len());
    }

    let inline: Vec<Range<usize>> = INLINE_CODE
        .find_iter(text)
        .map(|m| m.range())
        .filter(|r| !in_regions(&regions, r.start))
        .collect();
    regions.extend(inline);
    regions
}

fn fence_run(line: &str) -> Option<(char, usize)> {
    let ch = line.chars().next()?;
    if ch != '`' && ch != '~' {
        return None;
    }
    let len = line.chars().take_while(|&c| c == ch).count();
    (len >= 3).then_some((ch, len))
}

fn in_regions(regions: &[Range<usize>], pos: usize) -> bool {
    regions.iter().any(|r| r.contains(&pos))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(markers: &[CitationMarker]) -> Vec<Vec<&str>> {
        markers.iter().map(|m| m.keys().collect()).collect()
    }

    #[test]
    fn test_single_bracketed_citation() {
        let text = "Citation [@test]. \\bibliography";
        let markers = locate_markers(text, CitationSyntax::Bracketed);
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].literal, "[@test]");
        assert_eq!(&text[markers[0].span.clone()], "[@test]");
        assert_eq!(markers[0].citations, vec![Citation::new("test")]);
    }

    #[test]
    fn test_multiple_keys_keep_order() {
        let markers = locate_markers("See [@test2; @test] and [@Bivort2016]", CitationSyntax::Bracketed);
        assert_eq!(keys(&markers), vec![vec!["test2", "test"], vec!["Bivort2016"]]);
    }

    #[test]
    fn test_affixes() {
        let markers = locate_markers(
            "[@test, pp. 100] and [see @test, pp. 100, 200]",
            CitationSyntax::Bracketed,
        );
        assert_eq!(
            markers[0].citations,
            vec![Citation::new("test").with_suffix("pp. 100")]
        );
        assert_eq!(
            markers[1].citations,
            vec![
                Citation::new("test")
                    .with_prefix("see")
                    .with_suffix("pp. 100, 200")
            ]
        );
    }

    #[test]
    fn test_suppressed_author() {
        let markers = locate_markers("[-@test; see -@test2, p. 3]", CitationSyntax::Bracketed);
        let citations = &markers[0].citations;
        assert!(citations[0].suppress_author);
        assert_eq!(citations[0].prefix, "");
        assert!(citations[1].suppress_author);
        assert_eq!(citations[1].prefix, "see");
        assert_eq!(citations[1].suffix, "p. 3");
    }

    #[test]
    fn test_key_characters() {
        let markers = locate_markers(
            "[@doe:2020.a] [@a/b+c_d-e] [@key.]",
            CitationSyntax::Bracketed,
        );
        assert_eq!(
            keys(&markers),
            vec![vec!["doe:2020.a"], vec!["a/b+c_d-e"], vec!["key"]]
        );
        assert_eq!(markers[2].citations[0].suffix, ".");
    }

    #[test]
    fn test_non_citations_are_ignored() {
        let text = concat!(
            "Mail [someone@example.com] or [ask me at someone@example.com].\n",
            "A [link @home](https://example.com) and \\[@escaped].\n",
            "Nested [[@a]] is not a group with brackets inside.\n",
        );
        let markers = locate_markers(text, CitationSyntax::Bracketed);
        assert_eq!(keys(&markers), vec![vec!["a"]]);
        assert_eq!(markers[0].literal, "[@a]");
    }

    #[test]
    fn test_free_text_parts_are_dropped() {
        let markers = locate_markers("[@a; not a citation; @b]", CitationSyntax::Bracketed);
        assert_eq!(keys(&markers), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_code_is_skipped() {
        let text = concat!(
            "Inline `[@code]` stays.\n",
            "```python\n",
            "x = [@decorator]\n",
            "```\n",
            "~~~~\n",
            "[@tilde]\n",
            "~~~~\n",
            "But [@real] counts.\n",
        );
        let markers = locate_markers(text, CitationSyntax::Bracketed);
        assert_eq!(keys(&markers), vec![vec!["real"]]);
    }

    #[test]
    fn test_unclosed_fence_runs_to_end() {
        let markers = locate_markers("[@a]\n```\n[@b]\n", CitationSyntax::Bracketed);
        assert_eq!(keys(&markers), vec![vec!["a"]]);
    }

    #[test]
    fn test_bare_syntax() {
        let text = "As @test shows (@test2), mail me@example.com, not \\@escaped or `@code`.";
        let markers = locate_markers(text, CitationSyntax::Bare);
        assert_eq!(keys(&markers), vec![vec!["test"], vec!["test2"]]);
        assert_eq!(markers[0].literal, "@test");
        assert_eq!(&text[markers[1].span.clone()], "@test2");
    }

    #[test]
    fn test_handles_inside_urls_are_not_citations() {
        let text = "Follow https://mastodon.social/@test or <https://github.com/@user>.";
        assert!(locate_markers(text, CitationSyntax::Bare).is_empty());

        let text = concat!(
            "See [the profile](https://example.org/@someone) and [@real].\n",
            "Raw https://example.org/[@inurl] stays.\n",
            "Path docs/@notakey too.\n",
        );
        assert_eq!(
            keys(&locate_markers(text, CitationSyntax::Bare)),
            vec![vec!["real"]]
        );
        assert_eq!(
            keys(&locate_markers(text, CitationSyntax::Bracketed)),
            vec![vec!["real"]]
        );
    }

    #[test]
    fn test_url_text_spans() {
        let text = "a <https://x.org/@u> b https://y.org/@v c [t](z/@w) d";
        let spans: Vec<&str> = skipped_regions(text)
            .into_iter()
            .map(|r| &text[r])
            .collect();
        assert_eq!(
            spans,
            vec!["<https://x.org/@u>", "https://y.org/@v", "](z/@w)"]
        );
    }

    #[test]
    fn test_insertion_points() {
        let text = "A [@a].\n\n\\bibliography\n\nAll:\n\n\\full_bibliography\n";
        let points = locate_insertion_points(text, &LocatorOptions::default());
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].kind, InsertionKind::Bibliography);
        assert_eq!(&text[points[0].span.clone()], "\\bibliography");
        assert_eq!(points[1].kind, InsertionKind::FullBibliography);
        assert_eq!(&text[points[1].span.clone()], "\\full_bibliography");
        assert!(points.iter().all(|p| !p.implicit));
    }

    #[test]
    fn test_implicit_insertion_point() {
        let text = "A [@a].";
        let points = locate_insertion_points(text, &LocatorOptions::default());
        assert_eq!(
            points,
            vec![InsertionPoint {
                kind: InsertionKind::Bibliography,
                span: 7..7,
                implicit: true,
            }]
        );

        let options = LocatorOptions {
            insert_bibliography_by_default: false,
            ..Default::default()
        };
        assert!(locate_insertion_points(text, &options).is_empty());
    }

    #[test]
    fn test_overlapping_commands() {
        let options = LocatorOptions {
            bibliography_command: "\\bib".into(),
            full_bibliography_command: "\\bibfull".into(),
            insert_bibliography_by_default: false,
            ..Default::default()
        };
        let points = locate_insertion_points("\\bibfull\n\\bib\n", &options);
        assert_eq!(
            points.iter().map(|p| p.kind).collect::<Vec<_>>(),
            vec![InsertionKind::FullBibliography, InsertionKind::Bibliography]
        );
    }

    #[test]
    fn test_command_in_code_is_ignored() {
        let points = locate_insertion_points("Use `\\bibliography` here.", &LocatorOptions::default());
        assert_eq!(points.len(), 1);
        assert!(points[0].implicit);
    }

    #[test]
    fn test_scan_page_without_markers() {
        let options = LocatorOptions {
            insert_bibliography_by_default: false,
            ..Default::default()
        };
        assert!(scan_page("No citations here.", &options).is_empty());
    }
}
