/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * citedoc command-line entry point
 */

//! citedoc CLI - Main entry point

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use citedoc_core::CitationSyntax;

mod build;

#[derive(Parser, Debug)]
#[command(name = "citedoc")]
#[command(version)]
#[command(about = "Resolve and format BibTeX citations in Markdown pages", long_about = None)]
pub struct Args {
    /// Directory containing the .md pages
    #[arg(value_name = "INPUT_DIR")]
    pub input_dir: PathBuf,

    /// Directory the rewritten pages are written to
    #[arg(value_name = "OUTPUT_DIR", required_unless_present = "check")]
    pub output_dir: Option<PathBuf>,

    /// Configuration file (defaults to INPUT_DIR/citedoc.yml when present)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Bibliography file or URL; replaces the configured sources
    #[arg(short = 'b', long = "bib", value_name = "SOURCE")]
    pub bib: Vec<String>,

    /// CSL style file or URL
    #[arg(long)]
    pub csl: Option<String>,

    /// Fail when a cited key is not in the bibliography
    #[arg(long)]
    pub strict: bool,

    /// Citation syntax (bracketed or bare)
    #[arg(long)]
    pub syntax: Option<CitationSyntax>,

    /// Render citations inline with the CSL style
    #[arg(long)]
    pub inline: bool,

    /// Process pages without writing output
    #[arg(long)]
    pub check: bool,

    /// Verbose output (-v for debug logging)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short = 'q', long, conflicts_with = "verbose")]
    pub quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.quiet {
        "citedoc=warn,citedoc_core=warn"
    } else if args.verbose > 0 {
        "citedoc=debug,citedoc_core=debug"
    } else {
        "citedoc=info,citedoc_core=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if !build::execute(&args)? {
        std::process::exit(1);
    }
    Ok(())
}
