/*
 * format/mod.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Citation and reference formatting.
 */

//! Citation and reference formatting.
//!
//! Two rendering modes:
//!
//! - **Plain** (no style resource): citations become Markdown footnote
//!   references numbered in first-seen order across the build, and reference
//!   entries come from the built-in [`plain`] style.
//! - **Style-driven**: reference entries, and inline citation text when
//!   `render_inline` is set, come from a [`FormattingEngine`] fed the CSL
//!   style and a minimal BibTeX subset.
//!
//! With `cite_format: link` citations become bracketed links to anchors in
//! an HTML bibliography table instead of footnotes; the table cells always
//! use the plain style.
//!
//! An engine failure never aborts the build. The affected citation or
//! reference gets a visibly degraded placeholder and a warning diagnostic.

pub mod engine;
pub mod pandoc;
pub mod plain;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use citedoc_error_reporting::DiagnosticMessage;
use tracing::{debug, warn};

pub use engine::{EngineError, FormatMode, FormatRequest, FormattingEngine};
pub use pandoc::PandocEngine;
pub use plain::Markup;

use crate::bibliography::{Bibliography, BibliographyRecord};
use crate::citation::{Citation, CitationMarker};
use crate::error::warning_for;
use crate::resolver::unknown_key_placeholder;
use crate::resource::StyleResource;

/// A citation with its build-wide sequence number; `None` for unknown keys.
#[derive(Debug, Clone, Copy)]
pub struct NumberedCitation<'a> {
    pub citation: &'a Citation,
    pub number: Option<usize>,
}

/// Formatted text plus the warning to report if formatting degraded.
#[derive(Debug, Clone, PartialEq)]
pub struct Formatted {
    pub text: String,
    pub warning: Option<DiagnosticMessage>,
}

impl Formatted {
    fn ok(text: String) -> Self {
        Self {
            text,
            warning: None,
        }
    }
}

enum RenderStyle {
    Plain,
    Csl {
        style: StyleResource,
        engine: Arc<dyn FormattingEngine>,
        inline: bool,
    },
}

pub struct CitationFormatter {
    style: RenderStyle,
    ref_format: String,
    /// Page that link citations point at; `None` writes footnotes.
    link_target: Option<String>,
    engine_calls: AtomicUsize,
}

impl std::fmt::Debug for CitationFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match &self.style {
            RenderStyle::Plain => "plain".to_string(),
            RenderStyle::Csl { style, engine, inline } => format!(
                "{} via {}{}",
                style.origin(),
                engine.name(),
                if *inline { " (inline)" } else { "" }
            ),
        };
        f.debug_struct("CitationFormatter")
            .field("mode", &mode)
            .field("ref_format", &self.ref_format)
            .field("link_target", &self.link_target)
            .finish()
    }
}

impl CitationFormatter {
    /// Built-in plain style, no engine.
    pub fn plain(ref_format: impl Into<String>) -> Self {
        Self {
            style: RenderStyle::Plain,
            ref_format: ref_format.into(),
            link_target: None,
            engine_calls: AtomicUsize::new(0),
        }
    }

    /// Style-driven rendering through `engine`.
    pub fn with_style(
        style: StyleResource,
        engine: Arc<dyn FormattingEngine>,
        inline: bool,
        ref_format: impl Into<String>,
    ) -> Self {
        Self {
            style: RenderStyle::Csl {
                style,
                engine,
                inline,
            },
            ref_format: ref_format.into(),
            link_target: None,
            engine_calls: AtomicUsize::new(0),
        }
    }

    /// Write citations as links to anchors on `target`; an empty target
    /// links within the citing page.
    pub fn with_link_target(mut self, target: impl Into<String>) -> Self {
        self.link_target = Some(target.into());
        self
    }

    pub fn link_target(&self) -> Option<&str> {
        self.link_target.as_deref()
    }

    pub fn is_style_driven(&self) -> bool {
        matches!(self.style, RenderStyle::Csl { .. })
    }

    pub fn is_inline(&self) -> bool {
        matches!(self.style, RenderStyle::Csl { inline: true, .. })
    }

    /// Number of engine calls made so far.
    pub fn engine_calls(&self) -> usize {
        self.engine_calls.load(Ordering::Relaxed)
    }

    /// The footnote label for a key: `ref_format` with `{number}` and `{key}`
    /// filled in.
    pub fn ref_label(&self, number: usize, key: &str) -> String {
        self.ref_format
            .replace("{number}", &number.to_string())
            .replace("{key}", key)
    }

    /// `[^label]`
    pub fn footnote_ref(&self, number: usize, key: &str) -> String {
        format!("[^{}]", self.ref_label(number, key))
    }

    /// Footnote rendering of one marker.
    ///
    /// Affix text is kept next to the reference of the key it belongs to.
    /// With affixes present the pieces are joined with `; `, otherwise the
    /// references are written back to back.
    pub fn footnote_citation(&self, citations: &[NumberedCitation<'_>]) -> String {
        let pieces: Vec<String> = citations
            .iter()
            .map(|numbered| {
                let citation = numbered.citation;
                let reference = match numbered.number {
                    Some(number) => self.footnote_ref(number, &citation.key),
                    None => unknown_key_placeholder(&citation.key),
                };
                with_affixes(citation, reference)
            })
            .collect();

        if has_affixes(citations) {
            pieces.join("; ")
        } else {
            pieces.concat()
        }
    }

    /// Link rendering of one marker: `[[1](target#1), [2](target#2)]`.
    pub fn link_citation(&self, target: &str, citations: &[NumberedCitation<'_>]) -> String {
        let pieces: Vec<String> = citations
            .iter()
            .map(|numbered| {
                let citation = numbered.citation;
                let reference = match numbered.number {
                    Some(number) => format!(
                        "[{number}]({target}#{})",
                        self.ref_label(number, &citation.key)
                    ),
                    None => unknown_key_placeholder(&citation.key),
                };
                with_affixes(citation, reference)
            })
            .collect();

        let separator = if has_affixes(citations) { "; " } else { ", " };
        format!("[{}]", pieces.join(separator))
    }

    /// HTML table of numbered records, one anchored row per record. Empty
    /// when there are no records.
    pub fn link_bibliography<'r>(
        &self,
        entries: impl IntoIterator<Item = (usize, &'r BibliographyRecord)>,
    ) -> String {
        let rows: Vec<String> = entries
            .into_iter()
            .map(|(number, record)| {
                format!(
                    r#"<tr style="all: unset;" id="{}"> <td style="border:none; padding: 0.5vw;">[{number}]</td> <td style="border:none; padding: 0.5vw;">{}</td> </tr>"#,
                    self.ref_label(number, &record.key),
                    plain::format_record_as(record, Markup::Html)
                )
            })
            .collect();
        if rows.is_empty() {
            return String::new();
        }
        format!(
            r#"<table style="all: unset; border-collapse:collapse;">{}</table>"#,
            rows.join("\n")
        )
    }

    /// Replacement text for one marker.
    pub fn format_citation(
        &self,
        marker: &CitationMarker,
        citations: &[NumberedCitation<'_>],
        bibliography: &Bibliography,
    ) -> Formatted {
        if let Some(target) = &self.link_target {
            return Formatted::ok(self.link_citation(target, citations));
        }
        let RenderStyle::Csl {
            style,
            engine,
            inline: true,
        } = &self.style
        else {
            return Formatted::ok(self.footnote_citation(citations));
        };

        // The engine cannot render keys it has no record for.
        if citations.iter().any(|c| c.number.is_none()) {
            return Formatted::ok(self.footnote_citation(citations));
        }

        let refs: String = citations
            .iter()
            .filter_map(|c| c.number.map(|n| self.footnote_ref(n, &c.citation.key)))
            .collect();
        let bibtex = bibliography.subset_bibtex(marker.keys());
        let request = FormatRequest {
            bibtex: &bibtex,
            style: style.path(),
            mode: FormatMode::Citation {
                marker: &marker.literal,
            },
        };

        match self.call_engine(engine.as_ref(), &request, &marker.literal) {
            Ok(text) => Formatted::ok(format!("{text}{refs}")),
            Err(error) => {
                let text = format!("**⚠ citation unavailable: {}**{refs}", marker.literal);
                warn!(marker = %marker.literal, "{error}; writing placeholder");
                Formatted {
                    text,
                    warning: Some(engine_warning(&error, &format!("citation `{}`", marker.literal))),
                }
            }
        }
    }

    /// Reference-list text for one record.
    pub fn format_reference(&self, record: &BibliographyRecord) -> Formatted {
        let RenderStyle::Csl { style, engine, .. } = &self.style else {
            return Formatted::ok(plain::format_record(record));
        };

        let bibtex = record.to_bibtex();
        let request = FormatRequest {
            bibtex: &bibtex,
            style: style.path(),
            mode: FormatMode::Reference,
        };
        match self.call_engine(engine.as_ref(), &request, &record.key) {
            Ok(text) => Formatted::ok(text),
            Err(error) => {
                warn!(key = %record.key, "{error}; writing placeholder");
                Formatted {
                    text: format!("**⚠ reference unavailable: {}**", record.key),
                    warning: Some(engine_warning(&error, &format!("reference `{}`", record.key))),
                }
            }
        }
    }

    fn call_engine(
        &self,
        engine: &dyn FormattingEngine,
        request: &FormatRequest<'_>,
        subject: &str,
    ) -> Result<String, EngineError> {
        self.engine_calls.fetch_add(1, Ordering::Relaxed);
        debug!(engine = engine.name(), subject, "formatting");
        let result = engine.format(request);
        if result.is_ok() {
            debug!(engine = engine.name(), subject, "formatted");
        }
        result
    }
}

fn has_affixes(citations: &[NumberedCitation<'_>]) -> bool {
    citations.iter().any(|c| c.citation.has_affixes())
}

/// `prefix reference, suffix`
fn with_affixes(citation: &Citation, reference: String) -> String {
    let mut piece = String::new();
    if !citation.prefix.is_empty() {
        piece.push_str(&citation.prefix);
        piece.push(' ');
    }
    piece.push_str(&reference);
    if !citation.suffix.is_empty() {
        piece.push_str(", ");
        piece.push_str(&citation.suffix);
    }
    piece
}

fn engine_warning(error: &EngineError, subject: &str) -> DiagnosticMessage {
    warning_for("C-4-1")
        .problem(format!("Could not format {subject}"))
        .add_detail(error.to_string())
        .add_info("a placeholder was written instead")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CitationSyntax, DuplicateKeyPolicy};
    use crate::locator::locate_markers;
    use crate::resource::Fetcher;
    use std::io::Write;

    /// Deterministic engine.
    #[derive(Default)]
    struct FakeEngine {
        fail: bool,
    }

    impl FormattingEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        fn check(&self, _inline: bool) -> Result<(), EngineError> {
            Ok(())
        }

        fn format(&self, request: &FormatRequest<'_>) -> Result<String, EngineError> {
            if self.fail {
                return Err(EngineError::failed("fake", "boom"));
            }
            Ok(match request.mode {
                FormatMode::Reference => format!("REF {}", request.bibtex.lines().next().unwrap()),
                FormatMode::Citation { marker } => format!("(CITE {marker})"),
            })
        }
    }

    fn bibliography() -> Bibliography {
        let mut bib = Bibliography::new();
        let text = "@article{test, title = {Test title}, author = {Author, First}, journal = {J}, year = {2019}}\n\
                    @misc{other, title = {Other}}\n";
        for record in Bibliography::parse_source(text, "refs.bib").unwrap() {
            bib.insert(record, DuplicateKeyPolicy::Warn).unwrap();
        }
        bib
    }

    fn style_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csl").tempfile().unwrap();
        write!(file, "<style/>").unwrap();
        file
    }

    fn numbered<'a>(marker: &'a CitationMarker, numbers: &[Option<usize>]) -> Vec<NumberedCitation<'a>> {
        marker
            .citations
            .iter()
            .zip(numbers)
            .map(|(citation, number)| NumberedCitation {
                citation,
                number: *number,
            })
            .collect()
    }

    #[test]
    fn test_footnote_citations() {
        let formatter = CitationFormatter::plain("{number}");
        let markers = locate_markers(
            "[@test] [@test; @other] [@test, pp. 100] [see @test, pp. 100, 200] [-@test] [@nonexistent]",
            CitationSyntax::Bracketed,
        );

        let texts: Vec<String> = [
            (&markers[0], vec![Some(1)]),
            (&markers[1], vec![Some(1), Some(2)]),
            (&markers[2], vec![Some(1)]),
            (&markers[3], vec![Some(1)]),
            (&markers[4], vec![Some(1)]),
            (&markers[5], vec![None]),
        ]
        .iter()
        .map(|(marker, numbers)| formatter.footnote_citation(&numbered(marker, numbers)))
        .collect();

        assert_eq!(
            texts,
            vec![
                "[^1]",
                "[^1][^2]",
                "[^1], pp. 100",
                "see [^1], pp. 100, 200",
                "[^1]",
                "**⚠ nonexistent**",
            ]
        );
    }

    #[test]
    fn test_ref_format() {
        let formatter = CitationFormatter::plain("ref-{key}-{number}");
        assert_eq!(formatter.footnote_ref(3, "test"), "[^ref-test-3]");
    }

    #[test]
    fn test_link_citations() {
        let formatter = CitationFormatter::plain("{number}").with_link_target("");
        let bib = bibliography();
        let markers = locate_markers(
            "[@test; @other] [see @test, p. 4] [@nonexistent]",
            CitationSyntax::Bracketed,
        );

        let texts: Vec<String> = [
            (&markers[0], vec![Some(1), Some(2)]),
            (&markers[1], vec![Some(1)]),
            (&markers[2], vec![None]),
        ]
        .iter()
        .map(|(marker, numbers)| {
            formatter
                .format_citation(marker, &numbered(marker, numbers), &bib)
                .text
        })
        .collect();
        assert_eq!(
            texts,
            vec!["[[1](#1), [2](#2)]", "[see [1](#1), p. 4]", "[**⚠ nonexistent**]"]
        );

        let global = CitationFormatter::plain("ref-{key}").with_link_target("bibliography.md");
        assert_eq!(global.link_target(), Some("bibliography.md"));
        assert_eq!(
            global.link_citation("bibliography.md", &numbered(&markers[0], &[Some(1), Some(2)])),
            "[[1](bibliography.md#ref-test), [2](bibliography.md#ref-other)]"
        );
    }

    #[test]
    fn test_link_bibliography_table() {
        let formatter = CitationFormatter::plain("{number}").with_link_target("");
        let bib = bibliography();
        let table = formatter.link_bibliography([
            (1, bib.get("test").unwrap()),
            (2, bib.get("other").unwrap()),
        ]);
        insta::assert_snapshot!(table, @r#"
        <table style="all: unset; border-collapse:collapse;"><tr style="all: unset;" id="1"> <td style="border:none; padding: 0.5vw;">[1]</td> <td style="border:none; padding: 0.5vw;">First Author. Test title. <em>J</em>, 2019.</td> </tr>
        <tr style="all: unset;" id="2"> <td style="border:none; padding: 0.5vw;">[2]</td> <td style="border:none; padding: 0.5vw;">Other.</td> </tr></table>
        "#);
        assert_eq!(
            formatter.link_bibliography(Vec::<(usize, &BibliographyRecord)>::new()),
            ""
        );
    }

    #[test]
    fn test_plain_reference_needs_no_engine() {
        let formatter = CitationFormatter::plain("{number}");
        let bib = bibliography();
        let formatted = formatter.format_reference(bib.get("test").unwrap());
        assert_eq!(formatted.text, "First Author. Test title. *J*, 2019.");
        assert!(formatted.warning.is_none());
        assert_eq!(formatter.engine_calls(), 0);
    }

    #[test]
    fn test_style_driven_reference_and_inline_citation() {
        let file = style_file();
        let style = StyleResource::load(file.path().to_str().unwrap(), &Fetcher::new(1)).unwrap();
        let engine = Arc::new(FakeEngine::default());
        let formatter = CitationFormatter::with_style(style, engine.clone(), true, "{number}");
        let bib = bibliography();

        let reference = formatter.format_reference(bib.get("test").unwrap());
        assert_eq!(reference.text, "REF @article{test,");

        let markers = locate_markers("[see @test, p. 4]", CitationSyntax::Bracketed);
        let citation =
            formatter.format_citation(&markers[0], &numbered(&markers[0], &[Some(1)]), &bib);
        assert_eq!(citation.text, "(CITE [see @test, p. 4])[^1]");
        assert_eq!(formatter.engine_calls(), 2);
    }

    #[test]
    fn test_inline_with_unknown_key_skips_engine() {
        let file = style_file();
        let style = StyleResource::load(file.path().to_str().unwrap(), &Fetcher::new(1)).unwrap();
        let formatter =
            CitationFormatter::with_style(style, Arc::new(FakeEngine::default()), true, "{number}");

        let markers = locate_markers("[@test; @nonexistent]", CitationSyntax::Bracketed);
        let citation = formatter.format_citation(
            &markers[0],
            &numbered(&markers[0], &[Some(1), None]),
            &bibliography(),
        );
        assert_eq!(citation.text, "[^1]**⚠ nonexistent**");
        assert_eq!(formatter.engine_calls(), 0);
    }

    #[test]
    fn test_engine_failure_degrades() {
        let file = style_file();
        let style = StyleResource::load(file.path().to_str().unwrap(), &Fetcher::new(1)).unwrap();
        let engine = Arc::new(FakeEngine { fail: true });
        let formatter = CitationFormatter::with_style(style, engine, true, "{number}");
        let bib = bibliography();

        let reference = formatter.format_reference(bib.get("test").unwrap());
        assert_eq!(reference.text, "**⚠ reference unavailable: test**");
        let warning = reference.warning.unwrap();
        assert_eq!(warning.code.as_deref(), Some("C-4-1"));
        assert!(!warning.is_error());

        let markers = locate_markers("[@test]", CitationSyntax::Bracketed);
        let citation =
            formatter.format_citation(&markers[0], &numbered(&markers[0], &[Some(1)]), &bib);
        assert_eq!(citation.text, "**⚠ citation unavailable: [@test]**[^1]");
        assert!(citation.warning.is_some());
    }
}
