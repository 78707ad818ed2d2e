//! Copy-on-write Layers
//!
//! A layer holds only the entries that diverge from its parent. Lookups try
//! the layer first and then fall back to the parent, so "no local change" is
//! simply the absence of an own entry and memory stays proportional to the
//! size of the diff.

use std::collections::HashMap;
use std::hash::Hash;

/// Own entries over a parent lookup.
#[derive(Debug, Clone)]
pub struct Layer<K, V> {
    own: HashMap<K, V>,
}

impl<K: Eq + Hash, V: Clone> Layer<K, V> {
    pub fn new() -> Self {
        Self {
            own: HashMap::new(),
        }
    }

    /// The own entry, or whatever `parent` returns.
    pub fn get_or_else<F>(&self, key: &K, parent: F) -> Option<V>
    where
        F: FnOnce() -> Option<V>,
    {
        match self.own.get(key) {
            Some(value) => Some(value.clone()),
            None => parent(),
        }
    }

    pub fn own(&self, key: &K) -> Option<&V> {
        self.own.get(key)
    }

    pub fn own_mut(&mut self, key: &K) -> Option<&mut V> {
        self.own.get_mut(key)
    }

    pub fn has_own(&self, key: &K) -> bool {
        self.own.contains_key(key)
    }

    pub fn set_own(&mut self, key: K, value: V) -> Option<V> {
        self.own.insert(key, value)
    }

    /// Drop the own entry so lookups fall through to the parent.
    pub fn remove_own(&mut self, key: &K) -> Option<V> {
        self.own.remove(key)
    }

    pub fn own_keys(&self) -> impl Iterator<Item = &K> {
        self.own.keys()
    }

    pub fn own_len(&self) -> usize {
        self.own.len()
    }

    /// Replace the layer with an empty one over the same parent.
    pub fn reset(&mut self) -> HashMap<K, V> {
        std::mem::take(&mut self.own)
    }
}

impl<K: Eq + Hash, V: Clone> Default for Layer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
