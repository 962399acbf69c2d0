//! Value-to-index tables learned from walks.

use super::target::Target;
use super::walk::WalkSink;
use std::collections::HashMap;

/// Identifies one walked subtree on one logical session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    address: String,
    port: u16,
    oid: String,
    community_context: String,
    security_name: String,
}

impl CacheKey {
    pub fn new(target: &Target, oid: &str) -> Self {
        Self {
            address: target.address.clone(),
            port: target.port,
            oid: oid.to_string(),
            community_context: target.community_context().to_string(),
            security_name: target.security_name().to_string(),
        }
    }
}

/// Process-local index cache owned by one poller worker.
#[derive(Debug, Default)]
pub struct IndexCache {
    tables: HashMap<CacheKey, HashMap<String, String>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index last seen for `value` under `oid`.
    pub fn get(&self, target: &Target, oid: &str, value: &str) -> Option<&str> {
        self.tables
            .get(&CacheKey::new(target, oid))?
            .get(value)
            .map(String::as_str)
    }

    /// Record (or overwrite) the index for `value` under `oid`.
    pub fn put(&mut self, target: &Target, oid: &str, index: &str, value: &str) {
        self.tables
            .entry(CacheKey::new(target, oid))
            .or_default()
            .insert(value.to_string(), index.to_string());
    }

    /// Forget every mapping under `oid`, ahead of a rebuilding walk.
    pub fn invalidate(&mut self, target: &Target, oid: &str) {
        if let Some(table) = self.tables.get_mut(&CacheKey::new(target, oid)) {
            table.clear();
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Number of cached value mappings across all subtrees.
    pub fn len(&self) -> usize {
        self.tables.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Walk sink that records every (index, value) pair for `target`.
    pub fn filler<'a>(&'a mut self, target: &'a Target) -> CacheFiller<'a> {
        CacheFiller {
            cache: self,
            target,
        }
    }
}

pub struct CacheFiller<'a> {
    cache: &'a mut IndexCache,
    target: &'a Target,
}

impl WalkSink for CacheFiller<'_> {
    fn on_value(&mut self, root: &str, index: &str, value: &str) {
        self.cache.put(self.target, root, index, value);
    }
}
