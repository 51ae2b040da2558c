// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Bounded duplicate-ID cache.
//!
//! One cache exists per address that has carried a durable message, plus one
//! per cluster bridge (`BRIDGE.<node-id>`). Each cache keeps the most recent
//! `capacity` ids; older ids are evicted.

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Prefix of caches fed by cluster bridges.
pub const BRIDGE_CACHE_PREFIX: &str = "BRIDGE.";

/// Name of the cache used for messages bridged from `node_id`.
pub fn bridge_cache_name(node_id: &str) -> String {
    format!("{}{}", BRIDGE_CACHE_PREFIX, node_id)
}

/// Fixed-capacity cache of recently seen message ids.
pub struct DuplicateIdCache {
    name: String,
    ids: Mutex<LruCache<String, ()>>,
}

impl DuplicateIdCache {
    /// Create a cache; a zero capacity is raised to one slot.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.into(),
            ids: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record `id`; returns `false` if it was already present (a duplicate).
    pub fn insert_if_absent(&self, id: &str) -> bool {
        let mut ids = self.ids.lock();
        if ids.contains(id) {
            ids.promote(id);
            return false;
        }
        ids.put(id.to_string(), ());
        true
    }

    /// Forget `id`; returns `true` if it was recorded.
    pub fn remove(&self, id: &str) -> bool {
        self.ids.lock().pop(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.lock().contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.ids.lock().cap().get()
    }
}

impl std::fmt::Debug for DuplicateIdCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplicateIdCache")
            .field("name", &self.name)
            .field("len", &self.len())
            .finish()
    }
}
