/*
 * citedoc-error-reporting
 * Copyright (c) 2025 Posit, PBC
 *
 * Error reporting and diagnostic messages for citedoc.
 */

//! Error reporting and diagnostic messages for citedoc.
//!
//! Every problem citedoc reports, fatal or not, is a [`DiagnosticMessage`]
//! carrying a catalog code (see [`catalog`]). Messages are put together with
//! [`DiagnosticMessageBuilder`]. Unknown-key warnings point at the citing
//! marker; render them with a [`SourceContext`] of the page texts to show the
//! marker in place.
//!
//! # Example
//!
//! ```
//! use citedoc_error_reporting::DiagnosticMessageBuilder;
//!
//! let warning = DiagnosticMessageBuilder::warning("Unknown Citation Key")
//!     .with_code("C-3-1")
//!     .problem("Key `nonexistent` is not in the bibliography")
//!     .add_hint("Check the spelling of the key?")
//!     .build();
//!
//! assert!(warning.to_text(None).contains("nonexistent"));
//! ```

pub mod builder;
pub mod catalog;
pub mod diagnostic;

pub use builder::DiagnosticMessageBuilder;
pub use catalog::{ERROR_CATALOG, ErrorCodeInfo, get_error_info};
pub use diagnostic::{
    DetailItem, DetailKind, DiagnosticKind, DiagnosticMessage, SourceContext, SourceLocation,
};
