//! Memo cache for analyzer results.
//!
//! Impact reports are keyed by `(entity, change_kind)` and path searches by
//! `(source, target, max_depth)`. Entries are only valid for one graph
//! version and one analyzer configuration; call [`AnalysisCache::clear`]
//! when either changes. Partial results are never stored.
//!
//! Each kind of entry is capped at `max_entries`; inserting into a full
//! cache evicts the least-hit entry of that kind.

use dashmap::DashMap;
use ontoplan_proto::{ImpactKind, ImpactReport};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default entry cap per kind.
pub const DEFAULT_MAX_ENTRIES: usize = 1024;

/// Cache statistics.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    /// Get hit count.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Get miss count.
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Get eviction count.
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Calculate hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total > 0.0 {
            hits / total
        } else {
            0.0
        }
    }

    fn record<T>(&self, found: &Option<T>) {
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// A cached value with its own hit count, used to pick eviction victims.
#[derive(Debug)]
struct Cached<T> {
    value: T,
    hits: AtomicU64,
}

impl<T: Clone> Cached<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            hits: AtomicU64::new(0),
        }
    }

    fn hit(&self) -> T {
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.value.clone()
    }

    fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }
}

type PathKey = (String, String, usize);

/// Thread-safe memo cache shared between analyzer calls.
#[derive(Debug)]
pub struct AnalysisCache {
    impacts: DashMap<(String, ImpactKind), Cached<ImpactReport>>,
    paths: DashMap<PathKey, Cached<Vec<Vec<String>>>>,
    max_entries: usize,
    stats: CacheStats,
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }
}

impl AnalysisCache {
    /// Create an empty cache with the default entry cap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty cache holding at most `max_entries` entries per kind.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            impacts: DashMap::new(),
            paths: DashMap::new(),
            max_entries,
            stats: CacheStats::default(),
        }
    }

    /// Entry cap per kind.
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Cached impact report for an entity and change kind.
    pub fn impact(&self, entity: &str, kind: ImpactKind) -> Option<ImpactReport> {
        let found = self
            .impacts
            .get(&(entity.to_string(), kind))
            .map(|entry| entry.value().hit());
        self.stats.record(&found);
        found
    }

    /// Store an impact report. Partial reports are ignored.
    pub fn store_impact(&self, report: &ImpactReport) {
        if report.diagnostics.partial {
            return;
        }
        let key = (report.entity.clone(), report.change_kind);
        self.insert(&self.impacts, key, report.clone());
    }

    /// Cached node sequences between two nodes.
    pub fn paths(&self, source: &str, target: &str, max_depth: usize) -> Option<Vec<Vec<String>>> {
        let found = self
            .paths
            .get(&(source.to_string(), target.to_string(), max_depth))
            .map(|entry| entry.value().hit());
        self.stats.record(&found);
        found
    }

    /// Store the node sequences found between two nodes.
    pub fn store_paths(&self, source: &str, target: &str, max_depth: usize, paths: Vec<Vec<String>>) {
        let key = (source.to_string(), target.to_string(), max_depth);
        self.insert(&self.paths, key, paths);
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.impacts.len() + self.paths.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.impacts.clear();
        self.paths.clear();
    }

    fn insert<K, T>(&self, map: &DashMap<K, Cached<T>>, key: K, value: T)
    where
        K: Eq + Hash + Clone,
        T: Clone,
    {
        if self.max_entries == 0 {
            return;
        }
        if map.len() >= self.max_entries && !map.contains_key(&key) {
            self.evict_least_hit(map);
        }
        map.insert(key, Cached::new(value));
    }

    fn evict_least_hit<K, T>(&self, map: &DashMap<K, Cached<T>>)
    where
        K: Eq + Hash + Clone,
        T: Clone,
    {
        let victim = map
            .iter()
            .min_by_key(|entry| entry.value().hits())
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            map.remove(&key);
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }
}
