//! Diagnostic messages and their text rendering.
//!
//! A message reads top to bottom: a header line with the severity, the
//! catalog code and a title, then the problem statement, bulleted details,
//! and hints phrased as questions.
//!
//! Messages pinned to page text carry a [`SourceLocation`]. When rendered
//! against a [`SourceContext`] holding that page, the header and problem are
//! replaced by an ariadne snippet that underlines the offending text.

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;

use ariadne::{Color, Config, Label, Report, ReportKind, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The build cannot complete.
    Error,
    /// The build completes, but some output is degraded.
    Warning,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Warning => "Warning",
        })
    }
}

/// Bullet style of a detail line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetailKind {
    /// `✖`: something that is wrong.
    Error,
    /// `ℹ`: context that helps locate the problem.
    Info,
}

impl DetailKind {
    fn bullet(self) -> char {
        match self {
            DetailKind::Error => '✖',
            DetailKind::Info => 'ℹ',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailItem {
    pub kind: DetailKind,
    pub text: String,
}

/// A byte range within a named file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    /// Name the file is registered under in a [`SourceContext`].
    pub file: String,
    pub range: Range<usize>,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, range: Range<usize>) -> Self {
        Self {
            file: file.into(),
            range,
        }
    }
}

/// Text of the files diagnostics may point into, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct SourceContext {
    files: HashMap<String, String>,
}

impl SourceContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.files.insert(name.into(), content.into());
    }

    pub fn get_file(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }
}

/// A single error or warning, built with [`crate::DiagnosticMessageBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub kind: DiagnosticKind,
    /// Catalog code such as `C-3-1`.
    pub code: Option<String>,
    pub title: String,
    pub problem: Option<String>,
    pub details: Vec<DetailItem>,
    pub hints: Vec<String>,
    pub location: Option<SourceLocation>,
}

impl DiagnosticMessage {
    pub fn new(kind: DiagnosticKind, title: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            title: title.into(),
            problem: None,
            details: Vec::new(),
            hints: Vec::new(),
            location: None,
        }
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Error, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::Warning, title)
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == DiagnosticKind::Error
    }

    /// The header line: `Warning [C-3-1]: Unknown Citation Key`.
    fn header(&self) -> String {
        match &self.code {
            Some(code) => format!("{} [{code}]: {}", self.kind, self.title),
            None => format!("{}: {}", self.kind, self.title),
        }
    }

    /// Render as plain text.
    ///
    /// ```text
    /// Warning [C-3-1]: Unknown Citation Key
    /// Key `nonexistent` is not in the bibliography
    /// ℹ cited in index.md
    /// ? Check the spelling of the key?
    /// ```
    ///
    /// A located message whose file is in `sources` starts with a source
    /// snippet instead of the header and problem lines.
    pub fn to_text(&self, sources: Option<&SourceContext>) -> String {
        let snippet = self
            .location
            .as_ref()
            .zip(sources)
            .and_then(|(location, sources)| self.snippet(location, sources));

        let mut out = match snippet {
            Some(snippet) => snippet.trim_end().to_string(),
            None => {
                let mut head = self.header();
                if let Some(problem) = &self.problem {
                    head.push('\n');
                    head.push_str(problem);
                }
                head
            }
        };
        for detail in &self.details {
            out.push_str(&format!("\n{} {}", detail.kind.bullet(), detail.text));
        }
        for hint in &self.hints {
            out.push_str(&format!("\n? {hint}"));
        }
        out
    }

    fn snippet(&self, location: &SourceLocation, sources: &SourceContext) -> Option<String> {
        let text = sources.get_file(&location.file)?;
        let range = char_range(text, location.range.clone())?;

        let (kind, color) = match self.kind {
            DiagnosticKind::Error => (ReportKind::Error, Color::Red),
            DiagnosticKind::Warning => (ReportKind::Warning, Color::Yellow),
        };
        let title = match &self.code {
            Some(code) => format!("[{code}] {}", self.title),
            None => self.title.clone(),
        };
        let label = self.problem.clone().unwrap_or_else(|| self.title.clone());
        let file = location.file.clone();

        let mut rendered = Vec::new();
        Report::build(kind, file.clone(), range.start)
            .with_config(Config::default().with_color(false))
            .with_message(title)
            .with_label(
                Label::new((file.clone(), range))
                    .with_message(label)
                    .with_color(color),
            )
            .finish()
            .write((file, Source::from(text)), &mut rendered)
            .ok()?;
        String::from_utf8(rendered).ok()
    }
}

/// Convert a byte range of `text` into the char range ariadne expects.
/// `None` if the range is reversed, out of bounds or splits a char.
fn char_range(text: &str, bytes: Range<usize>) -> Option<Range<usize>> {
    if bytes.start > bytes.end {
        return None;
    }
    let start = text.get(..bytes.start)?.chars().count();
    let len = text.get(bytes.clone())?.chars().count();
    Some(start..start + len)
}
