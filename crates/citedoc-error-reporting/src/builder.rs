//! Fluent construction of [`DiagnosticMessage`]s.

use crate::diagnostic::{DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage, SourceLocation};

/// Builder for [`DiagnosticMessage`].
///
/// ```
/// use citedoc_error_reporting::DiagnosticMessageBuilder;
///
/// let error = DiagnosticMessageBuilder::error("Malformed Bibliography")
///     .with_code("C-1-2")
///     .problem("refs.bib is not valid BibTeX")
///     .add_detail("unexpected end of entry")
///     .add_hint("Check the last entry in the file?")
///     .build();
///
/// assert_eq!(error.code.as_deref(), Some("C-1-2"));
/// ```
#[derive(Debug, Clone)]
pub struct DiagnosticMessageBuilder(DiagnosticMessage);

impl DiagnosticMessageBuilder {
    pub fn error(title: impl Into<String>) -> Self {
        Self(DiagnosticMessage::new(DiagnosticKind::Error, title))
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self(DiagnosticMessage::new(DiagnosticKind::Warning, title))
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.0.code = Some(code.into());
        self
    }

    /// What went wrong, in one sentence.
    pub fn problem(mut self, problem: impl Into<String>) -> Self {
        self.0.problem = Some(problem.into());
        self
    }

    pub fn add_detail(self, text: impl Into<String>) -> Self {
        self.detail(DetailKind::Error, text.into())
    }

    pub fn add_info(self, text: impl Into<String>) -> Self {
        self.detail(DetailKind::Info, text.into())
    }

    /// A suggested fix, phrased as a question.
    pub fn add_hint(mut self, hint: impl Into<String>) -> Self {
        self.0.hints.push(hint.into());
        self
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.0.location = Some(location);
        self
    }

    pub fn build(self) -> DiagnosticMessage {
        self.0
    }

    fn detail(mut self, kind: DetailKind, text: String) -> Self {
        self.0.details.push(DetailItem { kind, text });
        self
    }
}
