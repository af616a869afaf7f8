//! Stage cache keyed by `(node, stage, cache key)`.

use super::DerivedNode;
use crate::content::NodeId;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

type CacheKey = (NodeId, String, String);

#[derive(Debug, Default)]
pub struct StageCache {
    entries: RwLock<FxHashMap<CacheKey, Arc<DerivedNode>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl StageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a stage result, counting the hit or miss.
    pub fn get(&self, id: &NodeId, stage: &str, key: &str) -> Option<Arc<DerivedNode>> {
        let found = self
            .entries
            .read()
            .get(&(id.clone(), stage.to_owned(), key.to_owned()))
            .cloned();

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, derived: Arc<DerivedNode>) {
        let key = (
            derived.parent_id.clone(),
            derived.stage_name.clone(),
            derived.cache_key.clone(),
        );
        self.entries.write().insert(key, derived);
    }

    /// Drop entries of `id` not present in `keep` (superseded results).
    pub fn prune(&self, id: &NodeId, keep: &[Arc<DerivedNode>]) {
        self.entries.write().retain(|(node, stage, key), _| {
            node != id
                || keep
                    .iter()
                    .any(|d| &d.stage_name == stage && &d.cache_key == key)
        });
    }

    /// Drop every entry of `id`.
    pub fn evict(&self, id: &NodeId) {
        self.entries.write().retain(|(node, _, _), _| node != id);
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }
}
