/*
 * build.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * One citedoc build over a directory of pages
 */

//! Build driver.
//!
//! Discovers pages, runs the numbering pre-pass in page order, rewrites the
//! pages in parallel and writes them out. Fatal errors and strict-mode
//! failures are printed as diagnostics and turn into a failing exit status.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rayon::prelude::*;
use tracing::{debug, info};
use walkdir::WalkDir;

use citedoc_core::{BuildContext, CitedocConfig, CitedocError};
use citedoc_error_reporting::{DiagnosticMessage, SourceContext};

use crate::Args;

/// Config file looked up in the input directory when `--config` is absent.
const DEFAULT_CONFIG: &str = "citedoc.yml";

struct Page {
    relative: PathBuf,
    text: String,
}

impl Page {
    /// Name the page goes by in diagnostics.
    fn id(&self) -> String {
        self.relative.to_string_lossy().into_owned()
    }
}

/// Run one build. Returns `false` when the build failed and the process
/// should exit non-zero.
pub fn execute(args: &Args) -> Result<bool> {
    if !args.input_dir.is_dir() {
        anyhow::bail!("Input path is not a directory: {:?}", args.input_dir);
    }

    let config = match resolve_config(args) {
        Ok(config) => config,
        Err(e) => return Ok(report_fatal(&e)),
    };
    let ctx = match BuildContext::from_config(config) {
        Ok(ctx) => ctx,
        Err(e) => return Ok(report_fatal(&e)),
    };

    let pages = discover_pages(&args.input_dir)?;
    info!("Found {} page(s) in {:?}", pages.len(), args.input_dir);

    // Numbers are fixed in page order before any parallel work starts.
    for page in &pages {
        ctx.register_page(&page.text);
    }

    let rewritten: Vec<(&Page, String)> = pages
        .par_iter()
        .map(|page| {
            let result = ctx.process_page(&page.id(), &page.text);
            (page, result.text)
        })
        .collect();

    if !args.check
        && let Some(output_dir) = &args.output_dir
    {
        for (page, text) in &rewritten {
            let output_path = output_dir.join(&page.relative);
            if let Some(parent) = output_path.parent() {
                fs::create_dir_all(parent)
                    .context(format!("Failed to create output directory: {:?}", parent))?;
            }
            fs::write(&output_path, text)
                .context(format!("Failed to write page: {:?}", output_path))?;
            debug!("wrote {:?}", output_path);
        }
    }

    let mut sources = SourceContext::new();
    for page in &pages {
        sources.add_file(page.id(), page.text.as_str());
    }

    match ctx.finish() {
        Ok(report) => {
            print_diagnostics(&report.diagnostics, &sources);
            eprintln!("{report}");
            Ok(true)
        }
        Err(e) => {
            let warnings: Vec<DiagnosticMessage> = ctx
                .warnings()
                .into_iter()
                .filter(|w| w.code.as_deref() != Some("C-3-1"))
                .collect();
            print_diagnostics(&warnings, &sources);
            Ok(report_fatal(&e))
        }
    }
}

/// The configuration file (explicit, or the default one when present) with
/// the command-line overrides applied.
fn resolve_config(args: &Args) -> Result<CitedocConfig, CitedocError> {
    let path = args
        .config
        .clone()
        .or_else(|| Some(args.input_dir.join(DEFAULT_CONFIG)).filter(|p| p.is_file()));
    let mut config = match path {
        Some(path) => {
            info!("Using configuration {:?}", path);
            CitedocConfig::load(&path)?
        }
        None => CitedocConfig::default(),
    };

    if !args.bib.is_empty() {
        config.bibliography_sources = args.bib.clone();
        config.bibliography_directory = None;
    }
    if let Some(csl) = &args.csl {
        config.style_resource = Some(csl.clone());
    }
    if let Some(syntax) = args.syntax {
        config.citation_syntax = syntax;
    }
    config.strict |= args.strict;
    config.render_inline |= args.inline;
    Ok(config)
}

/// Every `.md` file under `input_dir`, sorted by relative path.
fn discover_pages(input_dir: &Path) -> Result<Vec<Page>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(input_dir).sort_by_file_name() {
        let entry = entry.context(format!("Failed to read directory: {:?}", input_dir))?;
        if !entry.file_type().is_file() || entry.path().extension().is_none_or(|ext| ext != "md") {
            continue;
        }
        let text = fs::read_to_string(entry.path())
            .context(format!("Failed to read page: {:?}", entry.path()))?;
        let relative = entry
            .path()
            .strip_prefix(input_dir)
            .context("Failed to compute relative path")?
            .to_path_buf();
        pages.push(Page { relative, text });
    }
    pages.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(pages)
}

fn print_diagnostics(diagnostics: &[DiagnosticMessage], sources: &SourceContext) {
    for diagnostic in diagnostics {
        eprintln!("{}\n", diagnostic.to_text(Some(sources)));
    }
}

fn report_fatal(error: &CitedocError) -> bool {
    eprintln!("{}", error.to_diagnostic().to_text(None));
    false
}
