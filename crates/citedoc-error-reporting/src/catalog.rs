//! The error-code catalog.
//!
//! Codes have the form `C-<subsystem>-<n>`. The catalog is compiled in from
//! `error_catalog.json` and supplies the title every diagnostic with that
//! code is shown under.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorCodeInfo {
    /// `bibliography`, `style`, `citation`, `engine`, `config` or `internal`.
    pub subsystem: String,
    pub title: String,
    /// One sentence describing when the code is raised.
    pub summary: String,
}

pub static ERROR_CATALOG: Lazy<HashMap<String, ErrorCodeInfo>> = Lazy::new(|| {
    serde_json::from_str(include_str!("../error_catalog.json"))
        .expect("embedded error catalog is valid JSON")
});

/// Catalog entry for `code`, if it is a known code.
///
/// ```
/// use citedoc_error_reporting::get_error_info;
///
/// let info = get_error_info("C-3-1").unwrap();
/// assert_eq!(info.title, "Unknown Citation Key");
/// assert_eq!(info.subsystem, "citation");
/// ```
pub fn get_error_info(code: &str) -> Option<&'static ErrorCodeInfo> {
    ERROR_CATALOG.get(code)
}
