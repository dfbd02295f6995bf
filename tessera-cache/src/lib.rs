// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource type caching for Tessera
//!
//! Remembers whether an identifier names a collection and whether it carries a
//! link target, so type queries can skip a round trip. Content is never
//! cached. Entries have no TTL: they are dropped only by explicit invalidation,
//! so a mutation made behind the adapter's back can leave an entry stale.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tessera_core::{Identifier, ResourceType};

/// Cache statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: u64,
    pub hit_count: u64,
    pub miss_count: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hit_count + self.miss_count;
        if total == 0 { 0.0 } else { self.hit_count as f64 / total as f64 }
    }
}

/// Shared, thread-safe `Identifier -> ResourceType` map.
///
/// One instance is meant to be shared by reference between all adapters of a
/// backend session.
#[derive(Debug, Default)]
pub struct ResourceTypeCache {
    entries: RwLock<HashMap<Identifier, ResourceType>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResourceTypeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identifier: &Identifier) -> Option<ResourceType> {
        let found = self.entries.read().get(identifier).cloned();
        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    pub fn insert(&self, identifier: Identifier, resource_type: ResourceType) {
        self.entries.write().insert(identifier, resource_type);
    }

    pub fn contains(&self, identifier: &Identifier) -> bool {
        self.entries.read().contains_key(identifier)
    }

    /// Drop the entry of `identifier`.
    pub fn invalidate(&self, identifier: &Identifier) -> Option<ResourceType> {
        self.entries.write().remove(identifier)
    }

    /// Drop `identifier` and every entry below it.
    pub fn invalidate_tree(&self, identifier: &Identifier) -> usize {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|key, _| !key.starts_with(identifier));
        let removed = before - entries.len();
        if removed > 0 {
            tracing::debug!(%identifier, removed, "invalidated resource type entries");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len() as u64,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
        }
    }
}
