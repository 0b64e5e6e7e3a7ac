use std::collections::btree_map::{self, BTreeMap};

use crate::group_key::GroupKey;

/// Per-partition state keyed by [`GroupKey`], iterated in key order.
#[derive(Debug)]
pub struct GroupLookup<V> {
    entries: BTreeMap<GroupKey, V>,
}

impl<V> Default for GroupLookup<V> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }
}

impl<V> GroupLookup<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn lookup(&self, key: &GroupKey) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn lookup_mut(&mut self, key: &GroupKey) -> Option<&mut V> {
        self.entries.get_mut(key)
    }

    /// Insert or replace the state for `key`.
    pub fn set(&mut self, key: GroupKey, value: V) -> Option<V> {
        self.entries.insert(key, value)
    }

    pub fn delete(&mut self, key: &GroupKey) -> Option<V> {
        self.entries.remove(key)
    }

    pub fn entry(&mut self, key: GroupKey) -> btree_map::Entry<'_, GroupKey, V> {
        self.entries.entry(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &GroupKey> + '_ {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&GroupKey, &V)> + '_ {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&GroupKey, &mut V)> + '_ {
        self.entries.iter_mut()
    }

    /// Consume the lookup, yielding values in key order.
    pub fn into_values(self) -> impl Iterator<Item = V> {
        self.entries.into_values()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
