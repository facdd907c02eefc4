/*
 * rewriter.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Span replacement in page text.
 */

use std::ops::Range;

/// Replace the bytes in `span` with `text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub span: Range<usize>,
    pub text: String,
}

impl Replacement {
    pub fn new(span: Range<usize>, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }
}

/// Apply `replacements` to `text`.
///
/// Spans refer to the original text and must not overlap. They are applied
/// from the end of the page backwards so that no replacement shifts the
/// offsets of one still to come. Two empty spans at the same offset keep
/// their given order.
pub fn rewrite(text: &str, mut replacements: Vec<Replacement>) -> String {
    if replacements.is_empty() {
        return text.to_string();
    }

    replacements.sort_by_key(|r| (r.span.start, r.span.end));
    let mut out = text.to_string();
    for replacement in replacements.iter().rev() {
        debug_assert!(replacement.span.end <= text.len());
        out.replace_range(replacement.span.clone(), &replacement.text);
    }
    out
}
