/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Resolving cited keys against the bibliography.
 */

use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use citedoc_error_reporting::{DiagnosticMessage, SourceLocation};
use indexmap::IndexMap;
use tracing::warn;

use crate::bibliography::{Bibliography, BibliographyRecord};
use crate::citation::{Citation, CitationMarker};
use crate::error::warning_for;

/// Text written in place of a citation whose key is not in the bibliography.
pub fn unknown_key_placeholder(key: &str) -> String {
    format!("**⚠ {key}**")
}

/// Where an unknown key was cited: the page and the marker's byte span.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct CitingSite {
    page: String,
    start: usize,
    end: usize,
}

/// Keys cited during a build that are missing from the bibliography, with
/// the places citing them. Insertion order is first-seen order.
#[derive(Debug, Default)]
pub struct UnknownKeySet {
    keys: Mutex<IndexMap<String, Vec<CitingSite>>>,
}

impl UnknownKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that the marker at `span` on `page` cites the missing `key`.
    /// Returns `true` the first time `key` is recorded in this build.
    pub fn record(&self, key: &str, page: &str, span: Range<usize>) -> bool {
        let site = CitingSite {
            page: page.to_string(),
            start: span.start,
            end: span.end,
        };
        let mut keys = self.lock();
        match keys.get_mut(key) {
            Some(sites) => {
                sites.push(site);
                false
            }
            None => {
                keys.insert(key.to_string(), vec![site]);
                true
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Unknown keys and the pages that cite them, pages sorted by name.
    pub fn snapshot(&self) -> IndexMap<String, Vec<String>> {
        self.lock()
            .iter()
            .map(|(key, sites)| (key.clone(), citing_pages(sites)))
            .collect()
    }

    /// One warning per unknown key, listing the citing pages. The warning is
    /// located at the earliest citing marker so it can be shown in context.
    pub fn diagnostics(&self) -> Vec<DiagnosticMessage> {
        self.lock()
            .iter()
            .map(|(key, sites)| {
                let mut builder = warning_for("C-3-1")
                    .problem(format!("Key `{key}` is not in the bibliography"))
                    .add_info(format!("cited in {}", citing_pages(sites).join(", ")))
                    .add_hint("Check the spelling of the key?");
                if let Some(first) = sites.iter().min() {
                    builder = builder
                        .with_location(SourceLocation::new(&first.page, first.start..first.end));
                }
                builder.build()
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, Vec<CitingSite>>> {
        self.keys.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn citing_pages(sites: &[CitingSite]) -> Vec<String> {
    let mut pages: Vec<String> = sites.iter().map(|site| site.page.clone()).collect();
    pages.sort();
    pages.dedup();
    pages
}

/// A citation paired with its record, if the key is known.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedCitation<'m, 'b> {
    pub citation: &'m Citation,
    pub record: Option<&'b BibliographyRecord>,
}

impl ResolvedCitation<'_, '_> {
    pub fn is_known(&self) -> bool {
        self.record.is_some()
    }
}

/// Looks keys up in the bibliography and records the misses.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'b> {
    bibliography: &'b Bibliography,
    unknown: &'b UnknownKeySet,
}

impl<'b> Resolver<'b> {
    pub fn new(bibliography: &'b Bibliography, unknown: &'b UnknownKeySet) -> Self {
        Self {
            bibliography,
            unknown,
        }
    }

    /// Resolve every key of `marker`, left to right. A missing key never
    /// fails; it is recorded against `page` and logged once per build.
    pub fn resolve<'m>(
        &self,
        marker: &'m CitationMarker,
        page: &str,
    ) -> Vec<ResolvedCitation<'m, 'b>> {
        marker
            .citations
            .iter()
            .map(|citation| {
                let record = self.bibliography.get(&citation.key);
                if record.is_none()
                    && self.unknown.record(&citation.key, page, marker.span.clone())
                {
                    warn!(key = %citation.key, page, "citing unknown reference key");
                }
                ResolvedCitation { citation, record }
            })
            .collect()
    }
}
