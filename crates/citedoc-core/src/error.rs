//! Error types for citedoc-core
//!
//! [`CitedocError`] covers everything that aborts a build. Problems that only
//! degrade a single citation (unknown keys, engine failures) are reported as
//! warning diagnostics instead and never surface here, except for unknown keys
//! under strict mode.

use std::ops::Range;

use citedoc_error_reporting::{DiagnosticMessage, DiagnosticMessageBuilder, get_error_info};
use indexmap::IndexMap;
use thiserror::Error;

use crate::config::ConfigError;
use crate::format::EngineError;
use crate::resource::ResourceKind;

#[derive(Error, Debug)]
pub enum CitedocError {
    #[error("Cannot read bibliography source {location}: {error}")]
    BibliographyUnreadable {
        location: String,
        #[source]
        error: std::io::Error,
    },

    #[error("Malformed bibliography {location}: {message}")]
    BibliographyMalformed {
        location: String,
        message: String,
        /// Byte range of the offending text, when the parser reports one.
        span: Option<Range<usize>>,
    },

    #[error("Failed to fetch {url} after {attempts} attempt(s): {message}")]
    FetchFailed {
        kind: ResourceKind,
        url: String,
        attempts: u32,
        message: String,
    },

    #[error("Duplicate citation key `{key}` in {location} (first defined in {previous})")]
    DuplicateKey {
        key: String,
        location: String,
        previous: String,
    },

    #[error("No bibliography sources found")]
    NoBibliography,

    #[error("Cannot read style resource {location}: {error}")]
    StyleUnreadable {
        location: String,
        #[source]
        error: std::io::Error,
    },

    #[error("Style resource {location} is not a CSL style: {message}")]
    InvalidStyle { location: String, message: String },

    #[error("{} unresolved citation key(s)", .0.len())]
    UnknownKeys(IndexMap<String, Vec<String>>),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CitedocError {
    /// Stable error code from the diagnostic catalog.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BibliographyUnreadable { .. } => "C-1-1",
            Self::BibliographyMalformed { .. } => "C-1-2",
            Self::FetchFailed {
                kind: ResourceKind::Bibliography,
                ..
            } => "C-1-3",
            Self::FetchFailed {
                kind: ResourceKind::Style,
                ..
            } => "C-2-2",
            Self::DuplicateKey { .. } => "C-1-4",
            Self::NoBibliography => "C-1-5",
            Self::StyleUnreadable { .. } => "C-2-1",
            Self::InvalidStyle { .. } => "C-2-3",
            Self::UnknownKeys(_) => "C-3-2",
            Self::Engine(e) => e.code(),
            Self::Config(_) => "C-5-1",
            Self::Io(_) => "C-0-1",
        }
    }

    /// Convert to a structured diagnostic for end-of-build reporting.
    pub fn to_diagnostic(&self) -> DiagnosticMessage {
        let builder = error_for(self.code());
        match self {
            Self::BibliographyMalformed {
                location, message, ..
            } => builder
                .problem(format!("`{location}` is not valid BibTeX"))
                .add_detail(message.clone())
                .add_hint("Check the entry near the reported position?")
                .build(),
            Self::FetchFailed {
                url,
                attempts,
                message,
                ..
            } => builder
                .problem(format!("Could not download `{url}`"))
                .add_detail(message.clone())
                .add_info(format!("Tried {attempts} time(s)"))
                .add_hint("Raise `fetch_attempts` if the server is flaky?")
                .build(),
            Self::DuplicateKey {
                key,
                location,
                previous,
            } => builder
                .problem(format!("Key `{key}` is defined more than once"))
                .add_detail(format!("first defined in `{previous}`"))
                .add_detail(format!("defined again in `{location}`"))
                .add_hint("Set `duplicate_keys: warn` to let the later definition win?")
                .build(),
            Self::NoBibliography => builder
                .problem("No bibliography files were configured or found")
                .add_hint(
                    "Set `bibliography_sources` or point `bibliography_directory` at a folder of .bib files?",
                )
                .build(),
            Self::InvalidStyle { location, message } => builder
                .problem(format!("`{location}` is not a CSL style"))
                .add_detail(message.clone())
                .build(),
            Self::UnknownKeys(keys) => {
                let mut builder = builder.problem(format!(
                    "{} citation key(s) are not in the bibliography",
                    keys.len()
                ));
                for (key, pages) in keys {
                    builder = builder.add_detail(format!("`{key}` cited in {}", pages.join(", ")));
                }
                builder
                    .add_hint("Disable `strict` to build with placeholders instead?")
                    .build()
            }
            Self::Engine(e) => e.to_diagnostic(),
            other => builder.problem(other.to_string()).build(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CitedocError>;

fn catalog_title(code: &str) -> String {
    get_error_info(code)
        .map(|info| info.title.clone())
        .unwrap_or_else(|| "Internal Error".to_string())
}

/// Error builder titled from the catalog entry for `code`.
pub(crate) fn error_for(code: &str) -> DiagnosticMessageBuilder {
    DiagnosticMessageBuilder::error(catalog_title(code)).with_code(code)
}

/// Warning builder titled from the catalog entry for `code`.
pub(crate) fn warning_for(code: &str) -> DiagnosticMessageBuilder {
    DiagnosticMessageBuilder::warning(catalog_title(code)).with_code(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_in_catalog() {
        let errors = vec![
            CitedocError::NoBibliography,
            CitedocError::InvalidStyle {
                location: "style.csl".into(),
                message: "root element is `html`".into(),
            },
            CitedocError::FetchFailed {
                kind: ResourceKind::Style,
                url: "https://example.org/a.csl".into(),
                attempts: 2,
                message: "status 404".into(),
            },
            CitedocError::UnknownKeys(IndexMap::new()),
        ];
        for error in errors {
            assert!(get_error_info(error.code()).is_some(), "{}", error.code());
        }
    }

    #[test]
    fn test_fetch_failure_code_depends_on_resource() {
        let bib = CitedocError::FetchFailed {
            kind: ResourceKind::Bibliography,
            url: "https://example.org/refs.bib".into(),
            attempts: 1,
            message: "connection refused".into(),
        };
        assert_eq!(bib.code(), "C-1-3");
        assert_eq!(bib.to_diagnostic().title, "Bibliography Fetch Failed");
    }

    #[test]
    fn test_unknown_keys_diagnostic() {
        let mut keys = IndexMap::new();
        keys.insert("nonexistent".to_string(), vec!["index.md".to_string()]);
        let diagnostic = CitedocError::UnknownKeys(keys).to_diagnostic();

        insta::assert_snapshot!(diagnostic.to_text(None), @r"
        Error [C-3-2]: Unresolved Citations
        1 citation key(s) are not in the bibliography
        ✖ `nonexistent` cited in index.md
        ? Disable `strict` to build with placeholders instead?
        ");
    }
}
