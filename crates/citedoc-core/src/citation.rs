/*
 * citation.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Citation markers and bibliography insertion points found in page text.
 */

use std::fmt;
use std::ops::Range;

/// One cited key inside a marker, with its optional affix text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Citation {
    pub key: String,
    /// Free text before the key, e.g. `see`.
    pub prefix: String,
    /// Free text after the key, e.g. `pp. 100-102`.
    pub suffix: String,
    /// `-@key`: the author name is suppressed by style-driven renderers.
    pub suppress_author: bool,
}

impl Citation {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn has_affixes(&self) -> bool {
        !self.prefix.is_empty() || !self.suffix.is_empty()
    }
}

impl fmt::Display for Citation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.prefix.is_empty() {
            write!(f, "{} ", self.prefix)?;
        }
        if self.suppress_author {
            f.write_str("-")?;
        }
        write!(f, "@{}", self.key)?;
        if !self.suffix.is_empty() {
            write!(f, ", {}", self.suffix)?;
        }
        Ok(())
    }
}

/// A citation marker occurrence in one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationMarker {
    /// The exact source text of the marker, brackets included.
    ///
    /// Identical literals format identically within a build, so this is the
    /// inline cache key.
    pub literal: String,
    /// Cited keys in left-to-right order.
    pub citations: Vec<Citation>,
    /// Byte span of `literal` in the page text.
    pub span: Range<usize>,
}

impl CitationMarker {
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.citations.iter().map(|c| c.key.as_str())
    }

    pub fn has_affixes(&self) -> bool {
        self.citations.iter().any(Citation::has_affixes)
    }
}

/// Which reference list an insertion point receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InsertionKind {
    /// Entries cited on this page, in first-seen order.
    Bibliography,
    /// Every record in the bibliography.
    FullBibliography,
}

/// A place in a page where a reference list is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub kind: InsertionKind,
    /// Byte span of the command text; empty for the implicit end-of-page point.
    pub span: Range<usize>,
    /// Appended because no explicit bibliography command was present.
    pub implicit: bool,
}

/// Everything the locator found in one page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    pub markers: Vec<CitationMarker>,
    pub insertions: Vec<InsertionPoint>,
}

impl PageScan {
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty() && self.insertions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_citation_display() {
        assert_eq!(Citation::new("test").to_string(), "@test");
        assert_eq!(
            Citation::new("test")
                .with_prefix("see")
                .with_suffix("p. 123")
                .to_string(),
            "see @test, p. 123"
        );

        let suppressed = Citation {
            suppress_author: true,
            ..Citation::new("test")
        };
        assert_eq!(suppressed.to_string(), "-@test");
    }

    #[test]
    fn test_marker_keys_keep_order() {
        let marker = CitationMarker {
            literal: "[@b; @a]".to_string(),
            citations: vec![Citation::new("b"), Citation::new("a")],
            span: 0..8,
        };
        assert_eq!(marker.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert!(!marker.has_affixes());
    }
}
