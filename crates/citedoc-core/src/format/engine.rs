/*
 * format/engine.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * FormattingEngine trait definition.
 */

//! FormattingEngine trait for style-driven citation rendering.

use std::path::Path;

use citedoc_error_reporting::DiagnosticMessage;
use thiserror::Error;

use crate::error::error_for;

/// What the engine is asked to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatMode<'a> {
    /// The full reference text of the single entry in the request's BibTeX.
    Reference,
    /// Inline text for a citation marker, e.g. `(Author, 2019)`.
    Citation {
        /// The marker as written in the page, e.g. `[see @test, p. 4]`.
        marker: &'a str,
    },
}

/// One engine call.
#[derive(Debug, Clone, Copy)]
pub struct FormatRequest<'a> {
    /// BibTeX holding only the records the call needs.
    pub bibtex: &'a str,
    /// Local path of the CSL style.
    pub style: &'a Path,
    pub mode: FormatMode<'a>,
}

/// External formatting engine.
///
/// The engine turns a minimal BibTeX subset plus a CSL style into styled
/// Markdown text. Calls are blocking and may be slow; callers go through the
/// result cache so that each distinct marker or key is rendered once per
/// build.
///
/// # Thread Safety
///
/// Engines must be `Send + Sync`: pages are rewritten in parallel and share
/// one engine.
///
/// # Determinism
///
/// Identical requests must produce identical text.
pub trait FormattingEngine: Send + Sync {
    /// Human-readable name for logs and diagnostics.
    fn name(&self) -> &str;

    /// Check the engine can serve this build before any page is processed.
    ///
    /// `inline` is set when citations will be rendered inline, which may
    /// need a newer engine than reference rendering.
    fn check(&self, inline: bool) -> Result<(), EngineError>;

    /// Render one request.
    fn format(&self, request: &FormatRequest<'_>) -> Result<String, EngineError>;
}

/// Errors from a formatting engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine binary could not be found.
    #[error("Formatting engine not available: {engine}")]
    NotAvailable {
        engine: String,
        /// How the engine was looked for.
        searched: String,
    },

    /// The engine is too old for the requested feature.
    #[error("{engine} {found} is too old, {required} or newer is required")]
    TooOld {
        engine: String,
        found: String,
        required: String,
    },

    /// One call failed or produced output that could not be understood.
    #[error("{engine} failed: {message}")]
    Failed { engine: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn failed(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            engine: engine.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotAvailable { .. } => "C-4-2",
            Self::TooOld { .. } => "C-4-3",
            Self::Failed { .. } | Self::Io(_) => "C-4-1",
        }
    }

    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = error_for(self.code());
        match self {
            Self::NotAvailable { engine, searched } => builder
                .problem(format!("`{engine}` is needed to render citations with a CSL style"))
                .add_info(format!("searched {searched}"))
                .add_hint("Install pandoc, or set `pandoc` in the configuration?")
                .build(),
            Self::TooOld {
                engine,
                found,
                required,
            } => builder
                .problem(format!("Inline citations need {engine} {required} or newer"))
                .add_detail(format!("found {engine} {found}"))
                .add_hint("Upgrade pandoc, or turn off `render_inline`?")
                .build(),
            other => builder.problem(other.to_string()).build(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            EngineError::NotAvailable {
                engine: "pandoc".into(),
                searched: "PATH".into(),
            }
            .code(),
            "C-4-2"
        );
        assert_eq!(EngineError::failed("pandoc", "exit status 1").code(), "C-4-1");
    }

    #[test]
    fn test_too_old_diagnostic() {
        let error = EngineError::TooOld {
            engine: "pandoc".into(),
            found: "2.9.2".into(),
            required: "2.11".into(),
        };
        insta::assert_snapshot!(error.to_diagnostic().to_text(None), @r"
        Error [C-4-3]: Formatting Engine Too Old
        Inline citations need pandoc 2.11 or newer
        ✖ found pandoc 2.9.2
        ? Upgrade pandoc, or turn off `render_inline`?
        ");
    }
}
