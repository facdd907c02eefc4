/*
 * resource.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Local and remote bibliography/style resources.
 */

//! Local and remote resources.
//!
//! Bibliography sources and style resources are given as strings that are
//! either local paths or `http`/`https` URLs. Remote resources are downloaded
//! once per build into a temporary file that lives as long as the
//! [`LocalResource`] handle.

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use quick_xml::Reader;
use quick_xml::events::Event;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use url::Url;

use crate::error::{CitedocError, Result};

/// What a resource is used for; selects error codes and file suffixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Bibliography,
    Style,
}

impl ResourceKind {
    fn suffix(self) -> &'static str {
        match self {
            Self::Bibliography => ".bib",
            Self::Style => ".csl",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bibliography => f.write_str("bibliography"),
            Self::Style => f.write_str("style"),
        }
    }
}

/// True if `s` is an `http` or `https` URL.
pub fn is_remote(s: &str) -> bool {
    Url::parse(s)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceLocation {
    Local(PathBuf),
    Remote(Url),
}

impl ResourceLocation {
    pub fn parse(s: &str) -> Self {
        match Url::parse(s) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Remote(url),
            _ => Self::Local(PathBuf::from(s)),
        }
    }
}

impl fmt::Display for ResourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{url}"),
        }
    }
}

/// A resource available on the local filesystem.
#[derive(Debug)]
pub struct LocalResource {
    path: PathBuf,
    origin: String,
    // Keeps a downloaded resource on disk until the handle is dropped.
    _download: Option<NamedTempFile>,
}

impl LocalResource {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path or URL the resource was configured as.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn read_to_string(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }
}

/// Downloads remote resources with a bounded number of attempts.
#[derive(Debug, Clone)]
pub struct Fetcher {
    agent: ureq::Agent,
    attempts: u32,
}

impl Fetcher {
    pub fn new(attempts: u32) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_connect(Some(Duration::from_secs(10)))
            .timeout_global(Some(Duration::from_secs(60)))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            attempts: attempts.max(1),
        }
    }

    /// Download `url` as text. Any transport error or non-success status
    /// counts as a failed attempt; running out of attempts is fatal.
    pub fn fetch_text(&self, url: &Url, kind: ResourceKind) -> Result<String> {
        let mut last_error = String::new();
        for attempt in 1..=self.attempts {
            debug!(%url, attempt, "fetching {kind}");
            let body = self
                .agent
                .get(url.as_str())
                .call()
                .and_then(|response| response.into_body().read_to_string());
            match body {
                Ok(body) => return Ok(body),
                Err(error) => {
                    warn!(%url, attempt, "fetching {kind} failed: {error}");
                    last_error = error.to_string();
                }
            }
        }
        Err(CitedocError::FetchFailed {
            kind,
            url: url.to_string(),
            attempts: self.attempts,
            message: last_error,
        })
    }

    /// Make `location` available as a local file, downloading it if remote.
    pub fn materialize(
        &self,
        location: &ResourceLocation,
        kind: ResourceKind,
    ) -> Result<LocalResource> {
        match location {
            ResourceLocation::Local(path) => Ok(LocalResource {
                path: path.clone(),
                origin: location.to_string(),
                _download: None,
            }),
            ResourceLocation::Remote(url) => {
                let body = self.fetch_text(url, kind)?;
                let mut file = tempfile::Builder::new()
                    .prefix("citedoc-")
                    .suffix(kind.suffix())
                    .tempfile()?;
                file.write_all(body.as_bytes())?;
                file.flush()?;
                Ok(LocalResource {
                    path: file.path().to_path_buf(),
                    origin: url.to_string(),
                    _download: Some(file),
                })
            }
        }
    }
}

/// A validated CSL style, available as a local file for the engine.
#[derive(Debug)]
pub struct StyleResource {
    resource: LocalResource,
    title: Option<String>,
}

impl StyleResource {
    /// Load and validate the style at `location` (path or URL).
    ///
    /// An unreadable or invalid style is fatal: falling back to the plain
    /// style would hide the misconfiguration.
    pub fn load(location: &str, fetcher: &Fetcher) -> Result<Self> {
        let resource =
            fetcher.materialize(&ResourceLocation::parse(location), ResourceKind::Style)?;
        let xml = resource
            .read_to_string()
            .map_err(|error| CitedocError::StyleUnreadable {
                location: resource.origin().to_string(),
                error,
            })?;
        let title = inspect_csl(&xml).map_err(|message| CitedocError::InvalidStyle {
            location: resource.origin().to_string(),
            message,
        })?;
        debug!(style = resource.origin(), ?title, "loaded CSL style");
        Ok(Self { resource, title })
    }

    pub fn path(&self) -> &Path {
        self.resource.path()
    }

    pub fn origin(&self) -> &str {
        self.resource.origin()
    }

    /// The style's `<info><title>`, if it has one.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }
}

/// Check that `xml` is a CSL document (root element `style`) and pull out
/// its title.
fn inspect_csl(xml: &str) -> std::result::Result<Option<String>, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut seen_root = false;
    let mut in_title = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                let name = e.local_name();
                if !seen_root {
                    if name.as_ref() != b"style" {
                        return Err(format!(
                            "root element is `{}`, expected `style`",
                            String::from_utf8_lossy(name.as_ref())
                        ));
                    }
                    seen_root = true;
                } else if name.as_ref() == b"title" {
                    in_title = true;
                }
            }
            Ok(Event::Text(text)) if in_title => {
                let title = text.unescape().map_err(|e| e.to_string())?;
                return Ok(Some(title.into_owned()));
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"title" => in_title = false,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "XML error at position {}: {e}",
                    reader.buffer_position()
                ));
            }
        }
    }

    if seen_root {
        Ok(None)
    } else {
        Err("document has no root element".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.org/refs.bib"));
        assert!(is_remote("http://example.org/refs.bib"));
        assert!(!is_remote("refs.bib"));
        assert!(!is_remote("/abs/refs.bib"));
        assert!(!is_remote("file:///abs/refs.bib"));
    }

    #[test]
    fn test_location_parse() {
        assert_eq!(
            ResourceLocation::parse("docs/refs.bib"),
            ResourceLocation::Local(PathBuf::from("docs/refs.bib"))
        );
        assert!(matches!(
            ResourceLocation::parse("https://example.org/apa.csl"),
            ResourceLocation::Remote(_)
        ));
    }

    #[test]
    fn test_inspect_csl() {
        let style = r#"<?xml version="1.0" encoding="utf-8"?>
<style xmlns="http://purl.org/net/xbiblio/csl" class="in-text" version="1.0">
  <info><title>Test &amp; Style</title></info>
</style>"#;
        assert_eq!(inspect_csl(style), Ok(Some("Test & Style".to_string())));

        assert_eq!(inspect_csl("<style/>"), Ok(None));

        let err = inspect_csl("<html><body/></html>").unwrap_err();
        assert!(err.contains("`html`"), "{err}");

        assert!(inspect_csl("").is_err());
    }

    #[test]
    fn test_load_local_style() {
        let mut file = tempfile::Builder::new().suffix(".csl").tempfile().unwrap();
        write!(file, "<style><info><title>Local</title></info></style>").unwrap();

        let style =
            StyleResource::load(file.path().to_str().unwrap(), &Fetcher::new(1)).unwrap();
        assert_eq!(style.title(), Some("Local"));
        assert_eq!(style.path(), file.path());
    }

    #[test]
    fn test_missing_style_is_fatal() {
        let err = StyleResource::load("/nonexistent/style.csl", &Fetcher::new(1)).unwrap_err();
        assert_eq!(err.code(), "C-2-1");
    }

    #[test]
    fn test_invalid_style_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".csl").tempfile().unwrap();
        write!(file, "<bibliography/>").unwrap();

        let err = StyleResource::load(file.path().to_str().unwrap(), &Fetcher::new(1)).unwrap_err();
        assert_eq!(err.code(), "C-2-3");
    }
}
