/*
 * format/pandoc.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Pandoc as the external formatting engine.
 */

//! Pandoc-backed [`FormattingEngine`].
//!
//! # Finding pandoc
//!
//! [`find_pandoc`] searches in this order:
//! 1. The `pandoc` configuration value (a path, or a program name looked up
//!    on `PATH`)
//! 2. The `CITEDOC_PANDOC` environment variable
//! 3. System PATH via `which`
//!
//! # Calls
//!
//! ```text
//! reference:  pandoc -f bibtex -t markdown_strict --citeproc --csl STYLE          < subset.bib
//! citation:   pandoc -f markdown -t markdown-citations --citeproc --csl STYLE
//!                    --bibliography subset.bib                                    < marker
//! ```
//!
//! Pandoc wraps the requested text in bibliography markup; the extractors
//! below cut the text back out.

use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

use super::engine::{EngineError, FormatMode, FormatRequest, FormattingEngine};

/// Environment variable naming the pandoc binary.
pub const PANDOC_ENV: &str = "CITEDOC_PANDOC";

/// First version with built-in `--citeproc`.
const CITEPROC_VERSION: [u32; 2] = [2, 11];

const ENGINE_NAME: &str = "pandoc";

static CSL_SPAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span\s+class="csl-(?:left-margin|right-inline)">(.+?)</span>"#)
        .expect("Invalid regex pattern for CSL span")
});

static DIV_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?div[^>]*>").expect("Invalid regex pattern for div tag"));

/// Leading list numbering emitted by pandoc-citeproc.
static LEGACY_NUMBERING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[\d.\\\s]*(.*)$").expect("Invalid regex pattern for legacy numbering")
});

/// Find the pandoc binary.
///
/// Returns `None` if no candidate exists.
pub fn find_pandoc(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Some(path.to_path_buf());
        }
        return which::which(path).ok();
    }

    if let Ok(from_env) = std::env::var(PANDOC_ENV) {
        let path = PathBuf::from(from_env);
        if path.is_file() {
            return Some(path);
        }
    }

    which::which("pandoc").ok()
}

/// Parse the version from `pandoc --version` output (`pandoc 3.1.2`).
fn parse_version(output: &str) -> Option<Vec<u32>> {
    let first_line = output.lines().next()?;
    let version = first_line.split_whitespace().nth(1)?;
    version
        .split('.')
        .map(|part| part.parse().ok())
        .collect::<Option<Vec<u32>>>()
        .filter(|parts| !parts.is_empty())
}

fn format_version(version: &[u32]) -> String {
    version
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reference text from `markdown_strict` citeproc output: the second CSL
/// span (the entry body after its number) when present, otherwise the whole
/// output without the bibliography `<div>` wrappers.
fn extract_reference(output: &str) -> String {
    let joined = collapse_whitespace(output);
    if let Some(caps) = CSL_SPAN.captures_iter(&joined).nth(1) {
        return caps[1].trim().to_string();
    }
    collapse_whitespace(&DIV_TAG.replace_all(&joined, " "))
}

/// Inline citation text: everything before the `:::` bibliography div.
fn extract_citation(output: &str) -> String {
    let joined = collapse_whitespace(output);
    joined
        .split(":::")
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

fn extract_legacy_reference(output: &str) -> String {
    let joined = collapse_whitespace(output);
    LEGACY_NUMBERING
        .captures(&joined)
        .and_then(|caps| caps.get(1))
        .map_or(joined.as_str(), |m| m.as_str())
        .trim()
        .to_string()
}

/// Pandoc subprocess engine.
#[derive(Debug)]
pub struct PandocEngine {
    binary: Option<PathBuf>,
    searched: String,
    version: OnceCell<Vec<u32>>,
}

impl PandocEngine {
    /// Locate pandoc now; a missing binary is reported by [`FormattingEngine::check`].
    pub fn new(configured: Option<&Path>) -> Self {
        let searched = match configured {
            Some(path) => format!("configured path `{}`", path.display()),
            None => format!("`{PANDOC_ENV}` and PATH"),
        };
        Self {
            binary: find_pandoc(configured),
            searched,
            version: OnceCell::new(),
        }
    }

    /// Use a known binary without searching.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        let binary = binary.into();
        Self {
            searched: format!("`{}`", binary.display()),
            binary: Some(binary),
            version: OnceCell::new(),
        }
    }

    fn binary(&self) -> Result<&Path, EngineError> {
        self.binary
            .as_deref()
            .ok_or_else(|| EngineError::NotAvailable {
                engine: ENGINE_NAME.to_string(),
                searched: self.searched.clone(),
            })
    }

    /// The pandoc version, probed once.
    pub fn version(&self) -> Result<&[u32], EngineError> {
        self.version
            .get_or_try_init(|| {
                let output = self.run([OsStr::new("--version")], "")?;
                parse_version(&output).ok_or_else(|| {
                    EngineError::failed(ENGINE_NAME, "could not read version from `pandoc --version`")
                })
            })
            .map(Vec::as_slice)
    }

    fn has_citeproc(&self) -> Result<bool, EngineError> {
        Ok(self.version()? >= &CITEPROC_VERSION[..])
    }

    fn run<'a>(
        &self,
        args: impl IntoIterator<Item = &'a OsStr>,
        input: &str,
    ) -> Result<String, EngineError> {
        let binary = self.binary()?;
        let mut child = Command::new(binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EngineError::failed(
                    ENGINE_NAME,
                    format!("failed to spawn {}: {e}", binary.display()),
                )
            })?;

        // stdin is fed from its own thread while stdout and stderr drain, so
        // neither side blocks on a full pipe.
        let stdin = child.stdin.take();
        let (written, output) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || match stdin {
                Some(mut stdin) => stdin.write_all(input.as_bytes()),
                None => Ok(()),
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (written, output)
        });

        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::failed(
                ENGINE_NAME,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }
        written?;
        String::from_utf8(output.stdout)
            .map_err(|e| EngineError::failed(ENGINE_NAME, format!("output is not UTF-8: {e}")))
    }

    fn scratch_bibliography(bibtex: &str) -> Result<tempfile::NamedTempFile, EngineError> {
        let mut file = tempfile::Builder::new()
            .prefix("citedoc-")
            .suffix(".bib")
            .tempfile()?;
        file.write_all(bibtex.as_bytes())?;
        file.flush()?;
        Ok(file)
    }

    fn format_reference(&self, bibtex: &str, style: &Path) -> Result<String, EngineError> {
        if self.has_citeproc()? {
            let output = self.run(
                [
                    OsStr::new("-f"),
                    OsStr::new("bibtex"),
                    OsStr::new("-t"),
                    OsStr::new("markdown_strict"),
                    OsStr::new("--wrap=none"),
                    OsStr::new("--citeproc"),
                    OsStr::new("--csl"),
                    style.as_os_str(),
                ],
                bibtex,
            )?;
            return Ok(extract_reference(&output));
        }

        // pandoc < 2.11 ships citeproc as a separate filter.
        let bib = Self::scratch_bibliography(bibtex)?;
        let output = self.run(
            [
                OsStr::new("-f"),
                OsStr::new("markdown"),
                OsStr::new("-t"),
                OsStr::new("markdown_strict"),
                OsStr::new("--csl"),
                style.as_os_str(),
                OsStr::new("--bibliography"),
                bib.path().as_os_str(),
                OsStr::new("--filter"),
                OsStr::new("pandoc-citeproc"),
            ],
            "---\nnocite: '@*'\n---\n",
        )?;
        Ok(extract_legacy_reference(&output))
    }

    fn format_citation(
        &self,
        bibtex: &str,
        style: &Path,
        marker: &str,
    ) -> Result<String, EngineError> {
        let bib = Self::scratch_bibliography(bibtex)?;
        let output = self.run(
            [
                OsStr::new("-f"),
                OsStr::new("markdown"),
                OsStr::new("-t"),
                OsStr::new("markdown-citations"),
                OsStr::new("--wrap=none"),
                OsStr::new("--citeproc"),
                OsStr::new("--csl"),
                style.as_os_str(),
                OsStr::new("--bibliography"),
                bib.path().as_os_str(),
            ],
            marker,
        )?;
        Ok(extract_citation(&output))
    }
}

impl FormattingEngine for PandocEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn check(&self, inline: bool) -> Result<(), EngineError> {
        let version = self.version()?;
        debug!(version = %format_version(version), "found pandoc");
        if inline && version < &CITEPROC_VERSION[..] {
            return Err(EngineError::TooOld {
                engine: ENGINE_NAME.to_string(),
                found: format_version(version),
                required: format_version(&CITEPROC_VERSION),
            });
        }
        Ok(())
    }

    fn format(&self, request: &FormatRequest<'_>) -> Result<String, EngineError> {
        let text = match request.mode {
            FormatMode::Reference => self.format_reference(request.bibtex, request.style)?,
            FormatMode::Citation { marker } => {
                self.format_citation(request.bibtex, request.style, marker)?
            }
        };
        if text.is_empty() {
            return Err(EngineError::failed(ENGINE_NAME, "empty output"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            parse_version("pandoc 3.1.11.1\nFeatures: +server +lua\n"),
            Some(vec![3, 1, 11, 1])
        );
        assert_eq!(parse_version("pandoc.exe 2.9\n"), Some(vec![2, 9]));
        assert_eq!(parse_version("pandoc\n"), None);
        assert_eq!(parse_version(""), None);
    }

    #[test]
    fn test_version_ordering() {
        assert!([2u32, 11, 4][..] >= CITEPROC_VERSION[..]);
        assert!([3u32, 0][..] >= CITEPROC_VERSION[..]);
        assert!([2u32, 10, 1][..] < CITEPROC_VERSION[..]);
        assert!([2u32][..] < CITEPROC_VERSION[..]);
    }

    #[test]
    fn test_extract_numbered_reference() {
        let output = concat!(
            "<div id=\"refs\" class=\"references csl-bib-body\">\n",
            "<div id=\"ref-test\" class=\"csl-entry\">\n",
            "<span class=\"csl-left-margin\">\\[1\\] </span><span class=\"csl-right-inline\">F. Author and\n",
            "S. Author, “Test title,” *Testing Journal*, vol. 1, 2019.</span>\n",
            "</div>\n",
            "</div>\n",
        );
        assert_eq!(
            extract_reference(output),
            "F. Author and S. Author, “Test title,” *Testing Journal*, vol. 1, 2019."
        );
    }

    #[test]
    fn test_extract_author_date_reference() {
        let output = concat!(
            "<div id=\"refs\" class=\"references csl-bib-body hanging-indent\">\n\n",
            "<div id=\"ref-test\" class=\"csl-entry\">\n\n",
            "Author, F., & Author, S. (2019). Test title. *Testing Journal*, *1*.\n\n",
            "</div>\n\n",
            "</div>\n",
        );
        assert_eq!(
            extract_reference(output),
            "Author, F., & Author, S. (2019). Test title. *Testing Journal*, *1*."
        );
    }

    #[test]
    fn test_extract_citation() {
        let output = concat!(
            "(Author and Author 2019, 100)\n\n",
            "::: {#refs .references .csl-bib-body}\n",
            "::: {#ref-test .csl-entry}\n",
            "Author, F. 2019.\n",
            ":::\n",
            ":::\n",
        );
        assert_eq!(extract_citation(output), "(Author and Author 2019, 100)");
        assert_eq!(extract_citation("(Author\n2019)\n"), "(Author 2019)");
    }

    #[test]
    fn test_extract_legacy_reference() {
        assert_eq!(
            extract_legacy_reference("1\\. Author, F. Test title.\n"),
            "Author, F. Test title."
        );
    }

    #[test]
    fn test_missing_binary_is_reported() {
        let engine = PandocEngine::with_binary("/nonexistent/pandoc");
        let err = engine.check(false).unwrap_err();
        assert_eq!(err.code(), "C-4-1");

        let engine = PandocEngine {
            binary: None,
            searched: "PATH".to_string(),
            version: OnceCell::new(),
        };
        let err = engine.check(false).unwrap_err();
        assert_eq!(err.code(), "C-4-2");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_input_and_output_do_not_block() {
        // `cat` echoes stdin, so both pipes fill well past their buffers.
        let Ok(cat) = which::which("cat") else { return };
        let engine = PandocEngine::with_binary(cat);
        let input = "@misc{key, title = {Padding}}\n".repeat(40_000);

        let output = engine.run(std::iter::empty::<&OsStr>(), &input).unwrap();
        assert_eq!(output.len(), input.len());
    }

    #[test]
    #[ignore = "needs pandoc on PATH"]
    fn test_real_pandoc_version() {
        let engine = PandocEngine::new(None);
        engine.check(false).unwrap();
        assert!(!engine.version().unwrap().is_empty());
    }
}
