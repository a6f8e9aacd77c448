//! Resolver cache.
//!
//! Maps normalized logical paths to resolved URLs. Every entry is stamped
//! with the generation it was built under; advancing the generation makes
//! all older entries invisible without walking the map. Entries that hold
//! a local fallback URL are flagged, so callers who opted out of the
//! fallback never see them. The local base path is normalized once and
//! memoized.

use std::collections::HashMap;
use std::sync::OnceLock;

use tracing::debug;

use mirror_core::epoch_millis;
use mirror_core::url::{join, normalize_base_path};

/// A memoized resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedUrlEntry {
    pub logical_path: String,
    pub url: String,
    /// Unix timestamp (milliseconds) when the entry was built.
    pub built_at: u64,
    pub generation: u64,
    /// Local copy served because every origin was unhealthy.
    pub fallback: bool,
}

#[derive(Debug)]
pub struct ResolverCache {
    entries: HashMap<String, ResolvedUrlEntry>,
    generation: u64,
    raw_base_path: String,
    base_path: OnceLock<String>,
}

impl ResolverCache {
    pub fn new(local_base_path: &str) -> Self {
        Self {
            entries: HashMap::new(),
            generation: 0,
            raw_base_path: local_base_path.to_string(),
            base_path: OnceLock::new(),
        }
    }

    /// URL cached for `path` under the current generation.
    pub fn get(&self, path: &str) -> Option<&str> {
        self.lookup(path, true)
    }

    /// Like [`get`](Self::get), but skips fallback entries unless
    /// `allow_fallback` is set.
    pub fn lookup(&self, path: &str, allow_fallback: bool) -> Option<&str> {
        self.entries
            .get(path)
            .filter(|e| e.generation == self.generation)
            .filter(|e| allow_fallback || !e.fallback)
            .map(|e| e.url.as_str())
    }

    pub fn insert(&mut self, path: &str, url: &str) {
        self.store(path, url, false);
    }

    /// Cache a local fallback URL.
    pub fn insert_fallback(&mut self, path: &str, url: &str) {
        self.store(path, url, true);
    }

    fn store(&mut self, path: &str, url: &str, fallback: bool) {
        self.entries.insert(
            path.to_string(),
            ResolvedUrlEntry {
                logical_path: path.to_string(),
                url: url.to_string(),
                built_at: epoch_millis(),
                generation: self.generation,
                fallback,
            },
        );
    }

    pub fn remove(&mut self, path: &str) -> Option<ResolvedUrlEntry> {
        self.entries.remove(path)
    }

    /// Drop every entry and start a new generation.
    pub fn clear(&mut self) {
        let dropped = self.entries.len();
        self.entries.clear();
        self.advance_generation();
        debug!(dropped, generation = self.generation, "resolver cache cleared");
    }

    /// Invalidate all current entries without dropping them.
    pub fn advance_generation(&mut self) {
        self.generation += 1;
        // Stale entries are dead weight once the generation moves on.
        let generation = self.generation;
        self.entries.retain(|_, e| e.generation == generation);
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Number of entries valid under the current generation.
    pub fn len(&self) -> usize {
        self.entries
            .values()
            .filter(|e| e.generation == self.generation)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Normalized local base path, computed on first use.
    pub fn base_path(&self) -> &str {
        self.base_path
            .get_or_init(|| normalize_base_path(&self.raw_base_path))
    }

    /// Local fallback URL for a logical path.
    pub fn local_url(&self, path: &str) -> String {
        join(self.base_path(), path)
    }
}
