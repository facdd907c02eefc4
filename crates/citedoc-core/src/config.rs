/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Build configuration.
 */

//! Build configuration.
//!
//! [`CitedocConfig`] is read from a YAML file. Every field has a default, so
//! an empty file is a valid (if useless) configuration; [`CitedocConfig::validate`]
//! checks the combination before a build starts.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::resource::is_remote;

/// Surface syntax recognised for citation markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationSyntax {
    /// `[see @key1, p. 4; @key2]`
    #[default]
    Bracketed,
    /// `@key`
    Bare,
}

impl FromStr for CitationSyntax {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bracketed" => Ok(Self::Bracketed),
            "bare" => Ok(Self::Bare),
            other => Err(format!(
                "unknown citation syntax `{other}` (expected `bracketed` or `bare`)"
            )),
        }
    }
}

/// How a citation marker is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CiteFormat {
    /// `[^1]`, with footnote definitions as the bibliography.
    #[default]
    Footnote,
    /// `[[1](#1)]`, with an HTML table as the bibliography.
    Link,
}

/// Which citations a bibliography lists, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BibliographyScope {
    /// Each page lists its own citations at its bibliography command.
    #[default]
    Page,
    /// One site-wide list at the full bibliography command, numbered across
    /// all pages.
    Global,
}

/// What to do when two bibliography sources define the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeyPolicy {
    /// Abort the build.
    Error,
    /// Warn, then let the later source win.
    #[default]
    Warn,
    /// Silently keep the first definition.
    FirstWins,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file {}: {error}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Invalid config file {}: {error}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: serde_yaml::Error,
    },

    #[error("Invalid `{field}`: {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CitedocConfig {
    /// Bibliography files or http(s) URLs, loaded in order.
    #[serde(alias = "bibliography_source", deserialize_with = "one_or_many")]
    pub bibliography_sources: Vec<String>,
    /// Directory searched recursively for `*.bib` files.
    pub bibliography_directory: Option<PathBuf>,
    pub citation_syntax: CitationSyntax,
    pub bibliography_command: String,
    pub full_bibliography_command: String,
    pub insert_bibliography_by_default: bool,
    /// CSL style, as a path or URL. Without one the built-in plain style is used.
    pub style_resource: Option<String>,
    pub render_inline: bool,
    pub strict: bool,
    pub duplicate_keys: DuplicateKeyPolicy,
    pub cite_format: CiteFormat,
    pub bibliography_scope: BibliographyScope,
    /// Link target of the page holding the site-wide bibliography.
    pub global_bibliography_page: Option<String>,
    /// Footnote label template; `{number}` and `{key}` are substituted.
    pub ref_format: String,
    pub fetch_attempts: u32,
    pub pandoc: Option<PathBuf>,
}

impl Default for CitedocConfig {
    fn default() -> Self {
        Self {
            bibliography_sources: Vec::new(),
            bibliography_directory: None,
            citation_syntax: CitationSyntax::default(),
            bibliography_command: "\\bibliography".to_string(),
            full_bibliography_command: "\\full_bibliography".to_string(),
            insert_bibliography_by_default: true,
            style_resource: None,
            render_inline: false,
            strict: false,
            duplicate_keys: DuplicateKeyPolicy::default(),
            cite_format: CiteFormat::default(),
            bibliography_scope: BibliographyScope::default(),
            global_bibliography_page: None,
            ref_format: "{number}".to_string(),
            fetch_attempts: 1,
            pandoc: None,
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(source) => vec![source],
        OneOrMany::Many(sources) => sources,
    })
}

impl CitedocConfig {
    /// Read a config file. Relative paths inside it are resolved against the
    /// file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Read {
            path: path.to_path_buf(),
            error,
        })?;
        let mut config = Self::from_yaml(&text).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Make relative local paths absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.bibliography_sources {
            if !is_remote(source) && Path::new(source).is_relative() {
                *source = base.join(&*source).to_string_lossy().into_owned();
            }
        }
        if let Some(dir) = &mut self.bibliography_directory
            && dir.is_relative()
        {
            *dir = base.join(&*dir);
        }
        if let Some(style) = &mut self.style_resource
            && !is_remote(style)
            && Path::new(style).is_relative()
        {
            *style = base.join(&*style).to_string_lossy().into_owned();
        }
        // A bare program name is looked up on PATH, not next to the config.
        if let Some(pandoc) = &mut self.pandoc
            && pandoc.is_relative()
            && pandoc.components().count() > 1
        {
            *pandoc = base.join(&*pandoc);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bibliography_sources.is_empty() && self.bibliography_directory.is_none() {
            return Err(ConfigError::invalid(
                "bibliography_sources",
                "set at least one bibliography source or a bibliography_directory",
            ));
        }
        if !self.ref_format.contains("{number}") && !self.ref_format.contains("{key}") {
            return Err(ConfigError::invalid(
                "ref_format",
                format!(
                    "`{}` must contain `{{number}}` or `{{key}}`",
                    self.ref_format
                ),
            ));
        }
        if self.render_inline && self.style_resource.is_none() {
            return Err(ConfigError::invalid(
                "render_inline",
                "inline rendering requires a style_resource",
            ));
        }
        if self.render_inline && self.cite_format == CiteFormat::Link {
            return Err(ConfigError::invalid(
                "render_inline",
                "inline rendering cannot be combined with cite_format: link",
            ));
        }
        if self.bibliography_scope == BibliographyScope::Global {
            if self.cite_format != CiteFormat::Link {
                return Err(ConfigError::invalid(
                    "bibliography_scope",
                    "a global bibliography requires cite_format: link",
                ));
            }
            if self.global_bibliography_page.is_none() {
                return Err(ConfigError::invalid(
                    "global_bibliography_page",
                    "a global bibliography needs the page it lives on",
                ));
            }
        }
        if self.bibliography_command.trim().is_empty() {
            return Err(ConfigError::invalid("bibliography_command", "must not be empty"));
        }
        if self.full_bibliography_command.trim().is_empty() {
            return Err(ConfigError::invalid(
                "full_bibliography_command",
                "must not be empty",
            ));
        }
        if self.bibliography_command == self.full_bibliography_command {
            return Err(ConfigError::invalid(
                "full_bibliography_command",
                "must differ from bibliography_command",
            ));
        }
        if self.fetch_attempts == 0 {
            return Err(ConfigError::invalid("fetch_attempts", "must be at least 1"));
        }
        Ok(())
    }
}
