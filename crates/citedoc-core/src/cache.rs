/*
 * cache.rs
 * Copyright (c) 2025 Posit, PBC
 *
 * Build-scoped memoization of formatted citations and references.
 */

//! Result cache.
//!
//! Two independent maps, one keyed by literal marker text and one keyed by
//! citation key. Each entry is an [`OnceCell`]: concurrent requests for the
//! same key wait for the first computation instead of starting their own, so
//! each distinct key is formatted at most once per build.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::OnceCell;

#[derive(Debug, Default)]
struct OnceMap {
    cells: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
    computed: AtomicUsize,
    hits: AtomicUsize,
}

impl OnceMap {
    fn get_or_compute(&self, key: &str, compute: impl FnOnce() -> String) -> String {
        // The map lock is only held to find the cell, never while computing.
        let cell = {
            let mut cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(cells.entry(key.to_string()).or_default())
        };

        let mut computed_here = false;
        let value = cell.get_or_init(|| {
            computed_here = true;
            compute()
        });
        if computed_here {
            self.computed.fetch_add(1, Ordering::Relaxed);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        value.clone()
    }

    fn get(&self, key: &str) -> Option<String> {
        let cells = self.cells.lock().unwrap_or_else(PoisonError::into_inner);
        cells.get(key).and_then(|cell| cell.get().cloned())
    }
}

/// Counters for the end-of-build summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub citations_computed: usize,
    pub citation_hits: usize,
    pub references_computed: usize,
    pub reference_hits: usize,
}

/// Formatted citations (by literal marker text) and references (by key).
///
/// Owned by one build; a new build starts with a new cache.
#[derive(Debug, Default)]
pub struct ResultCache {
    citations: OnceMap,
    references: OnceMap,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The formatted citation for `literal`, computing it on first use.
    pub fn citation(&self, literal: &str, compute: impl FnOnce() -> String) -> String {
        self.citations.get_or_compute(literal, compute)
    }

    /// The formatted reference for `key`, computing it on first use.
    pub fn reference(&self, key: &str, compute: impl FnOnce() -> String) -> String {
        self.references.get_or_compute(key, compute)
    }

    pub fn cached_citation(&self, literal: &str) -> Option<String> {
        self.citations.get(literal)
    }

    pub fn cached_reference(&self, key: &str) -> Option<String> {
        self.references.get(key)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            citations_computed: self.citations.computed.load(Ordering::Relaxed),
            citation_hits: self.citations.hits.load(Ordering::Relaxed),
            references_computed: self.references.computed.load(Ordering::Relaxed),
            reference_hits: self.references.hits.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lookup_is_a_hit() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);
        let compute = || {
            calls.fetch_add(1, Ordering::SeqCst);
            "[^1]".to_string()
        };

        assert_eq!(cache.citation("[@test]", compute), "[^1]");
        assert_eq!(cache.citation("[@test]", compute), "[^1]");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.cached_citation("[@test]").as_deref(), Some("[^1]"));
        assert_eq!(
            cache.stats(),
            CacheStats {
                citations_computed: 1,
                citation_hits: 1,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_maps_are_independent() {
        let cache = ResultCache::new();
        cache.citation("test", || "citation".to_string());
        assert_eq!(cache.reference("test", || "reference".to_string()), "reference");
        assert_eq!(cache.cached_reference("missing"), None);
    }

    #[test]
    fn test_concurrent_requests_compute_once() {
        let cache = ResultCache::new();
        let calls = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    let value = cache.reference("test", || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(20));
                        "Author. Test title.".to_string()
                    });
                    assert_eq!(value, "Author. Test title.");
                });
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.references_computed, 1);
        assert_eq!(stats.reference_hits, 7);
    }
}
