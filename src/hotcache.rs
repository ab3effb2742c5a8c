//! Component I: the `HotCache` contract (§6) and one concrete, in-process
//! implementor of it.
//!
//! The fetch engine only ever depends on the [`HotCache`] trait; this
//! sharded map exists so the crate is runnable standalone (no separate
//! write-buffer process) and testable without one.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A thread-safe source of not-yet-flushed samples for a metric. Mirrors
/// the external `HotCache.Get(metric_name)` contract.
pub trait HotCache: Send + Sync {
    /// Returns the current in-memory samples for `metric_name`, most
    /// recent first or in any order -- the fetch engine only cares about
    /// timestamps, not ordering. Empty if the metric has nothing hot.
    fn get(&self, metric_name: &str) -> Vec<(i64, f64)>;
}

/// A `HotCache` with nothing in it. Used when no write-buffer producer is
/// configured; every fetch behaves as if the on-disk file were
/// authoritative.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyHotCache;

impl HotCache for EmptyHotCache {
    fn get(&self, _metric_name: &str) -> Vec<(i64, f64)> {
        Vec::new()
    }
}

/// The same concurrency idiom the index builder uses for its shared
/// `Snapshot` pointer, scaled down for a small hot-path lookup table: an
/// `Arc<RwLock<HashMap<..>>>` guarding a plain map from metric name to its
/// recent samples. There is no write path in this binary; population is
/// only useful for embedding this crate as a library inside a process
/// that also owns ingestion, or for driving tests.
#[derive(Debug, Default, Clone)]
pub struct InMemoryHotCache {
    inner: Arc<RwLock<HashMap<String, Vec<(i64, f64)>>>>,
}

impl InMemoryHotCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the samples held for `metric_name`.
    pub fn put(&self, metric_name: impl Into<String>, samples: Vec<(i64, f64)>) {
        let mut guard = self.inner.write().expect("hot cache lock poisoned");
        guard.insert(metric_name.into(), samples);
    }

    /// Drops all samples for `metric_name`.
    pub fn clear(&self, metric_name: &str) {
        let mut guard = self.inner.write().expect("hot cache lock poisoned");
        guard.remove(metric_name);
    }
}

impl HotCache for InMemoryHotCache {
    fn get(&self, metric_name: &str) -> Vec<(i64, f64)> {
        let guard = self.inner.read().expect("hot cache lock poisoned");
        guard.get(metric_name).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_returns_nothing() {
        let cache = EmptyHotCache;
        assert!(cache.get("servers.web1.cpu").is_empty());
    }

    #[test]
    fn in_memory_cache_round_trips() {
        let cache = InMemoryHotCache::new();
        assert!(cache.get("servers.web1.cpu").is_empty());
        cache.put("servers.web1.cpu", vec![(1000, 1.0), (1060, 2.0)]);
        assert_eq!(cache.get("servers.web1.cpu"), vec![(1000, 1.0), (1060, 2.0)]);
        assert!(cache.get("servers.web2.cpu").is_empty());
    }

    #[test]
    fn clear_removes_samples() {
        let cache = InMemoryHotCache::new();
        cache.put("m", vec![(1000, 1.0)]);
        cache.clear("m");
        assert!(cache.get("m").is_empty());
    }

    #[test]
    fn clone_shares_the_same_backing_map() {
        let cache = InMemoryHotCache::new();
        let clone = cache.clone();
        cache.put("m", vec![(1000, 1.0)]);
        assert_eq!(clone.get("m"), vec![(1000, 1.0)]);
    }
}
