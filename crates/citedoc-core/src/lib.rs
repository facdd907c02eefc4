//! Citation processing for Markdown documentation pages
//!
//! This crate finds citation markers such as `[see @key, p. 4]` in page
//! text, resolves them against a BibTeX bibliography and rewrites the page
//! with formatted citations and reference lists.
//!
//! # Architecture
//!
//! One build runs in two phases:
//!
//! - [`load_bibliography`] merges every configured source into a
//!   [`Bibliography`] once, before any page is touched.
//! - Each page goes through [`BuildContext::process_page`]: the
//!   [`locator`] finds markers and insertion points, the [`resolver`] looks
//!   keys up, the [`format`] module renders text (through the [`cache`]) and
//!   the [`rewriter`] splices it back in.
//!
//! [`BuildContext`] holds all cross-page state: first-seen numbering, the
//! result cache, unknown keys and warnings.
//!
//! # Example
//!
//! ```ignore
//! use citedoc_core::{BuildContext, CitedocConfig};
//!
//! let config = CitedocConfig::load("citedoc.yml".as_ref())?;
//! let ctx = BuildContext::from_config(config)?;
//!
//! ctx.register_page(&page);
//! let rewritten = ctx.process_page("index.md", &page);
//!
//! let report = ctx.finish()?;
//! ```

pub mod bibliography;
pub mod cache;
pub mod citation;
pub mod config;
pub mod context;
pub mod error;
pub mod format;
pub mod locator;
pub mod resolver;
pub mod resource;
pub mod rewriter;

// Re-export commonly used types
pub use bibliography::{Bibliography, BibliographyRecord, LoadedBibliography, load_bibliography};
pub use cache::{CacheStats, ResultCache};
pub use citation::{Citation, CitationMarker, InsertionKind, InsertionPoint, PageScan};
pub use config::{
    BibliographyScope, CitationSyntax, CiteFormat, CitedocConfig, ConfigError, DuplicateKeyPolicy,
};
pub use context::{BuildContext, BuildReport, CitationIndex, RewrittenPage};
pub use error::{CitedocError, Result};
pub use format::{
    CitationFormatter, EngineError, FormatMode, FormatRequest, FormattingEngine, PandocEngine,
};
pub use locator::{LocatorOptions, locate_insertion_points, locate_markers, scan_page};
pub use resolver::{Resolver, UnknownKeySet};
pub use resource::{Fetcher, ResourceKind, ResourceLocation, StyleResource};
