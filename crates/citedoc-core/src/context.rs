/*
 * context.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Build-scoped state shared by every page of one build.
 */

//! Build context.
//!
//! A [`BuildContext`] owns everything that outlives a single page: the
//! loaded bibliography, the formatter, the result cache, the build-wide
//! citation numbering, the unknown-key set and the collected warnings. One
//! context is created per build and passed by reference to every page.
//!
//! The context is `Sync`. Pages may be rewritten from several threads at
//! once; run [`BuildContext::register_page`] over all pages in page order
//! first so that numbering does not depend on scheduling. A global
//! bibliography lists every registered key, so it also depends on that pass.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use citedoc_error_reporting::DiagnosticMessage;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::bibliography::{Bibliography, BibliographyRecord, load_bibliography};
use crate::cache::{CacheStats, ResultCache};
use crate::citation::InsertionKind;
use crate::config::{BibliographyScope, CiteFormat, CitedocConfig};
use crate::error::{CitedocError, Result};
use crate::format::{CitationFormatter, FormattingEngine, NumberedCitation, PandocEngine};
use crate::locator::{LocatorOptions, scan_page};
use crate::resolver::{Resolver, UnknownKeySet};
use crate::resource::{Fetcher, StyleResource};
use crate::rewriter::{Replacement, rewrite};

/// Build-wide citation numbers, assigned on first sight.
#[derive(Debug, Default)]
pub struct CitationIndex {
    numbers: Mutex<IndexMap<String, usize>>,
}

impl CitationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of `key`, assigning the next one if `key` is new.
    pub fn number_for(&self, key: &str) -> usize {
        let mut numbers = self.lock();
        if let Some(number) = numbers.get(key) {
            return *number;
        }
        let number = numbers.len() + 1;
        numbers.insert(key.to_string(), number);
        number
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.lock().get(key).copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Numbered keys, in number order.
    pub fn entries(&self) -> Vec<(String, usize)> {
        self.lock()
            .iter()
            .map(|(key, number)| (key.clone(), *number))
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, usize>> {
        self.numbers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One rewritten page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewrittenPage {
    pub text: String,
    /// Markers replaced in this page.
    pub markers: usize,
    /// Known keys cited in this page, in first-seen order.
    pub cited_keys: Vec<String>,
}

/// End-of-build summary.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub pages: usize,
    pub markers: usize,
    /// Distinct known keys cited anywhere in the build.
    pub distinct_keys: usize,
    pub engine_calls: usize,
    pub unknown_keys: usize,
    pub cache: CacheStats,
    pub diagnostics: Vec<DiagnosticMessage>,
}

impl std::fmt::Display for BuildReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} page(s), {} citation(s) replaced, {} distinct key(s), {} engine call(s), {} unknown key(s)",
            self.pages, self.markers, self.distinct_keys, self.engine_calls, self.unknown_keys
        )
    }
}

/// State shared by all pages of one build.
#[derive(Debug)]
pub struct BuildContext {
    config: CitedocConfig,
    locator: LocatorOptions,
    bibliography: Bibliography,
    formatter: CitationFormatter,
    cache: ResultCache,
    index: CitationIndex,
    unknown: UnknownKeySet,
    diagnostics: Mutex<Vec<DiagnosticMessage>>,
    pages: AtomicUsize,
    markers: AtomicUsize,
}

impl BuildContext {
    /// Assemble a context from already loaded parts. Under
    /// `cite_format: link` the formatter is switched to link citations.
    pub fn new(
        config: CitedocConfig,
        bibliography: Bibliography,
        formatter: CitationFormatter,
    ) -> Self {
        let formatter = match (config.cite_format, config.bibliography_scope) {
            (CiteFormat::Footnote, _) => formatter,
            (CiteFormat::Link, BibliographyScope::Page) => formatter.with_link_target(""),
            (CiteFormat::Link, BibliographyScope::Global) => formatter
                .with_link_target(config.global_bibliography_page.clone().unwrap_or_default()),
        };
        Self {
            locator: LocatorOptions::from(&config),
            config,
            bibliography,
            formatter,
            cache: ResultCache::new(),
            index: CitationIndex::new(),
            unknown: UnknownKeySet::new(),
            diagnostics: Mutex::new(Vec::new()),
            pages: AtomicUsize::new(0),
            markers: AtomicUsize::new(0),
        }
    }

    /// Validate `config`, load the bibliography and style, and probe pandoc
    /// when a style is configured.
    pub fn from_config(config: CitedocConfig) -> Result<Self> {
        let engine = Arc::new(PandocEngine::new(config.pandoc.as_deref()));
        Self::with_engine(config, engine)
    }

    /// Like [`BuildContext::from_config`], with a caller-supplied engine for
    /// style-driven rendering.
    pub fn with_engine(config: CitedocConfig, engine: Arc<dyn FormattingEngine>) -> Result<Self> {
        config.validate()?;
        let fetcher = Fetcher::new(config.fetch_attempts);
        let loaded = load_bibliography(&config, &fetcher)?;

        let formatter = match &config.style_resource {
            Some(location) => {
                let style = StyleResource::load(location, &fetcher)?;
                engine.check(config.render_inline)?;
                info!(
                    style = style.title().unwrap_or(style.origin()),
                    engine = engine.name(),
                    inline = config.render_inline,
                    "Rendering citations with CSL style"
                );
                CitationFormatter::with_style(
                    style,
                    engine,
                    config.render_inline,
                    config.ref_format.clone(),
                )
            }
            None => CitationFormatter::plain(config.ref_format.clone()),
        };

        info!("Loaded {} bibliography entries", loaded.bibliography.len());
        let context = Self::new(config, loaded.bibliography, formatter);
        context.lock_diagnostics().extend(loaded.diagnostics);
        Ok(context)
    }

    pub fn config(&self) -> &CitedocConfig {
        &self.config
    }

    pub fn bibliography(&self) -> &Bibliography {
        &self.bibliography
    }

    pub fn formatter(&self) -> &CitationFormatter {
        &self.formatter
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn index(&self) -> &CitationIndex {
        &self.index
    }

    pub fn unknown_keys(&self) -> &UnknownKeySet {
        &self.unknown
    }

    /// Number every known key cited in `text`, in document order.
    ///
    /// Keys that already have a number keep it.
    pub fn register_page(&self, text: &str) {
        let scan = scan_page(text, &self.locator);
        for marker in &scan.markers {
            for key in marker.keys() {
                if self.bibliography.contains_key(key) {
                    self.index.number_for(key);
                }
            }
        }
    }

    /// Rewrite one page: replace its citation markers and fill its
    /// bibliography insertion points.
    pub fn process_page(&self, page_id: &str, text: &str) -> RewrittenPage {
        self.pages.fetch_add(1, Ordering::Relaxed);
        let scan = scan_page(text, &self.locator);
        if scan.markers.is_empty() && scan.insertions.iter().all(|p| p.implicit) {
            debug!(page = page_id, "no citations");
            return RewrittenPage {
                text: text.to_string(),
                markers: 0,
                cited_keys: Vec::new(),
            };
        }

        let resolver = Resolver::new(&self.bibliography, &self.unknown);
        let mut replacements = Vec::with_capacity(scan.markers.len() + scan.insertions.len());
        let mut cited: IndexMap<&str, usize> = IndexMap::new();

        for marker in &scan.markers {
            let numbered: Vec<NumberedCitation<'_>> = resolver
                .resolve(marker, page_id)
                .into_iter()
                .map(|resolved| NumberedCitation {
                    citation: resolved.citation,
                    number: resolved.record.map(|r| self.index.number_for(&r.key)),
                })
                .collect();
            for &NumberedCitation { citation, number } in &numbered {
                if let Some(number) = number {
                    cited.entry(citation.key.as_str()).or_insert(number);
                }
            }

            let rendered = self.cache.citation(&marker.literal, || {
                let formatted =
                    self.formatter
                        .format_citation(marker, &numbered, &self.bibliography);
                if let Some(warning) = formatted.warning {
                    self.lock_diagnostics().push(warning);
                }
                formatted.text
            });
            replacements.push(Replacement::new(marker.span.clone(), rendered));
        }

        for point in &scan.insertions {
            let list = match (point.kind, self.config.bibliography_scope) {
                (InsertionKind::Bibliography, BibliographyScope::Page) => {
                    self.page_bibliography(&cited)
                }
                (InsertionKind::FullBibliography, BibliographyScope::Page) => {
                    self.full_bibliography()
                }
                // The global list replaces both kinds of per-page list.
                (InsertionKind::Bibliography, BibliographyScope::Global) => String::new(),
                (InsertionKind::FullBibliography, BibliographyScope::Global) => {
                    self.global_bibliography()
                }
            };
            let replacement = if point.implicit && !list.is_empty() {
                let gap = if text.ends_with('\n') { "\n" } else { "\n\n" };
                format!("{gap}{list}\n")
            } else {
                list
            };
            replacements.push(Replacement::new(point.span.clone(), replacement));
        }

        self.markers.fetch_add(scan.markers.len(), Ordering::Relaxed);
        debug!(
            page = page_id,
            markers = scan.markers.len(),
            keys = cited.len(),
            "rewrote page"
        );
        RewrittenPage {
            text: rewrite(text, replacements),
            markers: scan.markers.len(),
            cited_keys: cited.keys().map(|k| k.to_string()).collect(),
        }
    }

    /// The bibliography of one page: footnote definitions, or a link table
    /// after a horizontal rule.
    fn page_bibliography(&self, cited: &IndexMap<&str, usize>) -> String {
        if self.formatter.link_target().is_some() {
            let table = self.formatter.link_bibliography(
                cited
                    .iter()
                    .filter_map(|(key, number)| Some((*number, self.bibliography.get(key)?))),
            );
            return if table.is_empty() {
                table
            } else {
                format!("\n---\n{table}")
            };
        }
        cited
            .iter()
            .filter_map(|(key, number)| {
                let record = self.bibliography.get(key)?;
                Some(format!(
                    "[^{}]: {}",
                    self.formatter.ref_label(*number, key),
                    self.reference_text(record)
                ))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every record in load order, as an ordered list.
    fn full_bibliography(&self) -> String {
        self.bibliography
            .iter()
            .enumerate()
            .map(|(i, record)| format!("{}. {}", i + 1, self.reference_text(record)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Every key numbered in this build, as one link table.
    fn global_bibliography(&self) -> String {
        let entries = self.index.entries();
        self.formatter.link_bibliography(
            entries
                .iter()
                .filter_map(|(key, number)| Some((*number, self.bibliography.get(key)?))),
        )
    }

    fn reference_text(&self, record: &BibliographyRecord) -> String {
        self.cache.reference(&record.key, || {
            let formatted = self.formatter.format_reference(record);
            if let Some(warning) = formatted.warning {
                self.lock_diagnostics().push(warning);
            }
            formatted.text
        })
    }

    /// Warnings collected so far, followed by one warning per unknown key.
    pub fn warnings(&self) -> Vec<DiagnosticMessage> {
        let mut warnings = self.lock_diagnostics().clone();
        warnings.extend(self.unknown.diagnostics());
        warnings
    }

    /// Close the build.
    ///
    /// Under strict mode any unknown key fails the build with
    /// [`CitedocError::UnknownKeys`].
    pub fn finish(&self) -> Result<BuildReport> {
        if self.config.strict && !self.unknown.is_empty() {
            return Err(CitedocError::UnknownKeys(self.unknown.snapshot()));
        }
        Ok(BuildReport {
            pages: self.pages.load(Ordering::Relaxed),
            markers: self.markers.load(Ordering::Relaxed),
            distinct_keys: self.index.len(),
            engine_calls: self.formatter.engine_calls(),
            unknown_keys: self.unknown.len(),
            cache: self.cache.stats(),
            diagnostics: self.warnings(),
        })
    }

    fn lock_diagnostics(&self) -> MutexGuard<'_, Vec<DiagnosticMessage>> {
        self.diagnostics.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
