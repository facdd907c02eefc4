/*
 * bibliography.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Bibliography records and the bibliography loader.
 */

//! Bibliography records and loading.
//!
//! Sources are parsed with `biblatex` and flattened into
//! [`BibliographyRecord`]s: plain strings per field, plus parsed author and
//! editor names. Each record also keeps its fields in BibTeX form, brace
//! groups intact, so the entry handed to a formatting engine protects the
//! same words and corporate names the source did. Records from all sources are merged into one
//! [`Bibliography`] under the configured [`DuplicateKeyPolicy`]. The
//! bibliography is built once, before any page is processed, and is
//! read-only afterwards.

use std::fmt;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use biblatex::{Chunk, Entry, EntryType, Person, Spanned};
use citedoc_error_reporting::DiagnosticMessage;
use indexmap::IndexMap;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{CitedocConfig, DuplicateKeyPolicy};
use crate::error::{CitedocError, Result, warning_for};
use crate::resource::{Fetcher, ResourceKind, ResourceLocation};

/// A parsed person name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Name {
    pub given: String,
    /// Particle such as `von` or `de`.
    pub prefix: String,
    pub family: String,
    pub suffix: String,
}

impl From<&Person> for Name {
    fn from(person: &Person) -> Self {
        Self {
            given: person.given_name.clone(),
            prefix: person.prefix.clone(),
            family: person.name.clone(),
            suffix: person.suffix.clone(),
        }
    }
}

impl fmt::Display for Name {
    /// `Given prefix Family, Suffix`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts = [&self.given, &self.prefix, &self.family];
        let mut first = true;
        for part in parts.into_iter().filter(|p| !p.is_empty()) {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(part)?;
            first = false;
        }
        if !self.suffix.is_empty() {
            write!(f, ", {}", self.suffix)?;
        }
        Ok(())
    }
}

/// One bibliographic entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibliographyRecord {
    pub key: String,
    /// Lowercase entry type, e.g. `article`.
    pub entry_type: String,
    /// Field values with markup resolved and whitespace collapsed.
    pub fields: IndexMap<String, String>,
    /// Field values as BibTeX text: `{...}` protection kept, macros expanded.
    pub bibtex_fields: IndexMap<String, String>,
    pub authors: Vec<Name>,
    pub editors: Vec<Name>,
    /// The path or URL this record was loaded from.
    pub origin: String,
}

impl BibliographyRecord {
    fn from_entry(entry: &Entry, origin: &str) -> Self {
        let fields = entry
            .fields
            .iter()
            .map(|(name, chunks)| (name.to_lowercase(), flatten_chunks(chunks)))
            .collect();
        let bibtex_fields = entry
            .fields
            .iter()
            .map(|(name, chunks)| (name.to_lowercase(), bibtex_value(chunks)))
            .collect();
        let authors = entry
            .author()
            .map(|people| people.iter().map(Name::from).collect())
            .unwrap_or_default();
        let editors = entry
            .editors()
            .map(|groups| {
                groups
                    .iter()
                    .flat_map(|(people, _)| people.iter().map(Name::from))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            key: entry.key.clone(),
            entry_type: entry_type_name(&entry.entry_type),
            fields,
            bibtex_fields,
            authors,
            editors,
            origin: origin.to_string(),
        }
    }

    /// A non-empty field value.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// This record as a standalone BibTeX entry.
    pub fn to_bibtex(&self) -> String {
        let mut out = format!("@{}{{{},\n", self.entry_type, self.key);
        for (name, value) in &self.bibtex_fields {
            let _ = writeln!(out, "  {name} = {{{value}}},");
        }
        out.push_str("}\n");
        out
    }
}

fn entry_type_name(entry_type: &EntryType) -> String {
    entry_type.to_string().to_lowercase()
}

fn flatten_chunks(chunks: &[Spanned<Chunk>]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        match &chunk.v {
            Chunk::Normal(s) | Chunk::Verbatim(s) => text.push_str(s),
            Chunk::Math(s) => {
                text.push('$');
                text.push_str(s);
                text.push('$');
            }
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn bibtex_value(chunks: &[Spanned<Chunk>]) -> String {
    let mut text = String::new();
    for chunk in chunks {
        match &chunk.v {
            Chunk::Normal(s) => text.push_str(s),
            Chunk::Verbatim(s) => {
                text.push('{');
                text.push_str(s);
                text.push('}');
            }
            Chunk::Math(s) => {
                text.push('$');
                text.push_str(s);
                text.push('$');
            }
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All records of a build, keyed by citation key, in load order.
#[derive(Debug, Clone, Default)]
pub struct Bibliography {
    records: IndexMap<String, BibliographyRecord>,
}

impl Bibliography {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse BibTeX `text` loaded from `origin`.
    pub fn parse_source(text: &str, origin: &str) -> Result<Vec<BibliographyRecord>> {
        let parsed = biblatex::Bibliography::parse(text).map_err(|e| {
            CitedocError::BibliographyMalformed {
                location: origin.to_string(),
                message: e.to_string(),
                span: Some(e.span.clone()),
            }
        })?;
        Ok(parsed
            .iter()
            .map(|entry| BibliographyRecord::from_entry(entry, origin))
            .collect())
    }

    /// Add `record`, resolving a key clash with `policy`.
    ///
    /// Returns a warning diagnostic when a clash was resolved by replacing the
    /// earlier record. A replaced record keeps the position of the first
    /// definition.
    pub fn insert(
        &mut self,
        record: BibliographyRecord,
        policy: DuplicateKeyPolicy,
    ) -> Result<Option<DiagnosticMessage>> {
        let Some(previous) = self.records.get(&record.key).map(|r| r.origin.clone()) else {
            self.records.insert(record.key.clone(), record);
            return Ok(None);
        };

        match policy {
            DuplicateKeyPolicy::Error => Err(CitedocError::DuplicateKey {
                key: record.key,
                location: record.origin,
                previous,
            }),
            DuplicateKeyPolicy::FirstWins => {
                debug!(key = %record.key, origin = %record.origin, "ignoring duplicate key");
                Ok(None)
            }
            DuplicateKeyPolicy::Warn => {
                warn!(
                    key = %record.key,
                    previous = %previous,
                    origin = %record.origin,
                    "duplicate citation key, the later definition wins"
                );
                let diagnostic = warning_for("C-1-4")
                    .problem(format!("Key `{}` is defined more than once", record.key))
                    .add_info(format!("first defined in `{previous}`"))
                    .add_info(format!("using the definition from `{}`", record.origin))
                    .build();
                self.records.insert(record.key.clone(), record);
                Ok(Some(diagnostic))
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&BibliographyRecord> {
        self.records.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.records.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in load order.
    pub fn iter(&self) -> impl Iterator<Item = &BibliographyRecord> {
        self.records.values()
    }

    /// BibTeX text holding only the records for `keys`. Unknown keys are
    /// skipped.
    pub fn subset_bibtex<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> String {
        let mut seen = Vec::new();
        let mut out = String::new();
        for key in keys {
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            if let Some(record) = self.get(key) {
                out.push_str(&record.to_bibtex());
            }
        }
        out
    }
}

/// The merged bibliography plus the warnings produced while merging.
#[derive(Debug, Default)]
pub struct LoadedBibliography {
    pub bibliography: Bibliography,
    pub diagnostics: Vec<DiagnosticMessage>,
}

/// Every `*.bib` file under `dir`, sorted by path.
pub fn discover_bib_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| CitedocError::BibliographyUnreadable {
            location: dir.display().to_string(),
            error: e.into(),
        })?;
        if entry.file_type().is_file() && entry.path().extension().is_some_and(|ext| ext == "bib")
        {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// The configured sources in load order: explicit sources first, then the
/// files found in the bibliography directory.
pub fn configured_sources(config: &CitedocConfig) -> Result<Vec<ResourceLocation>> {
    let mut sources: Vec<ResourceLocation> = config
        .bibliography_sources
        .iter()
        .map(|s| ResourceLocation::parse(s))
        .collect();
    if let Some(dir) = &config.bibliography_directory {
        sources.extend(
            discover_bib_files(dir)?
                .into_iter()
                .map(ResourceLocation::Local),
        );
    }
    Ok(sources)
}

/// Load and merge every configured bibliography source.
///
/// Any unreadable, unreachable or malformed source fails the whole load.
pub fn load_bibliography(config: &CitedocConfig, fetcher: &Fetcher) -> Result<LoadedBibliography> {
    let sources = configured_sources(config)?;
    if sources.is_empty() {
        return Err(CitedocError::NoBibliography);
    }
    info!(
        "Loading bibliography from {}",
        sources
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    let mut loaded = LoadedBibliography::default();
    for location in &sources {
        let text = match location {
            ResourceLocation::Local(path) => {
                std::fs::read_to_string(path).map_err(|error| {
                    CitedocError::BibliographyUnreadable {
                        location: location.to_string(),
                        error,
                    }
                })?
            }
            ResourceLocation::Remote(url) => fetcher.fetch_text(url, ResourceKind::Bibliography)?,
        };

        let records = Bibliography::parse_source(&text, &location.to_string())?;
        debug!(source = %location, entries = records.len(), "parsed bibliography source");
        for record in records {
            if let Some(diagnostic) = loaded.bibliography.insert(record, config.duplicate_keys)? {
                loaded.diagnostics.push(diagnostic);
            }
        }
    }
    Ok(loaded)
}
