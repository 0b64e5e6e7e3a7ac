//! At most one output builder per partition.

use std::collections::btree_map::Entry;

use log::trace;

use crate::builder::TableBuilder;
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::group_lookup::GroupLookup;
use crate::table::BufferedTable;
use crate::time::Time;
use crate::trigger::{TableContext, Trigger, TriggerContext, TriggerSpec};

/// The outcome of [`TableBuilderCache::table_builder`].
#[derive(Debug)]
pub enum BuilderEntry<'a> {
    /// First request for the key since it was last expired; the caller declares the schema.
    Created(&'a mut TableBuilder),
    /// The key already has a builder with its schema in place; the caller only appends rows.
    Existing(&'a mut TableBuilder),
}

impl<'a> BuilderEntry<'a> {
    pub fn is_created(&self) -> bool {
        matches!(self, BuilderEntry::Created(_))
    }

    pub fn into_builder(self) -> &'a mut TableBuilder {
        match self {
            BuilderEntry::Created(b) | BuilderEntry::Existing(b) => b,
        }
    }

    /// For transformations that produce one table per key: an existing builder means a second
    /// input table arrived for the key.
    pub fn expect_created(self) -> Result<&'a mut TableBuilder> {
        match self {
            BuilderEntry::Created(b) => Ok(b),
            BuilderEntry::Existing(b) => Err(Error::DuplicateTable {
                key: b.key().to_string(),
            }),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    builder: TableBuilder,
    trigger: Box<dyn Trigger>,
}

/// What trigger evaluation decided for one partition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TriggerOutcome {
    pub key: GroupKey,
    pub fired: bool,
    pub finished: bool,
}

/// Output builders keyed by partition, each guarded by a trigger built from one [`TriggerSpec`].
#[derive(Debug)]
pub struct TableBuilderCache {
    tables: GroupLookup<CacheEntry>,
    trigger_spec: TriggerSpec,
}

impl Default for TableBuilderCache {
    fn default() -> Self {
        Self::new(TriggerSpec::default())
    }
}

impl TableBuilderCache {
    pub fn new(trigger_spec: TriggerSpec) -> Self {
        Self {
            tables: GroupLookup::new(),
            trigger_spec,
        }
    }

    pub fn trigger_spec(&self) -> &TriggerSpec {
        &self.trigger_spec
    }

    /// Applies to partitions created after the call.
    pub fn set_trigger_spec(&mut self, spec: TriggerSpec) {
        self.trigger_spec = spec;
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn contains(&self, key: &GroupKey) -> bool {
        self.tables.lookup(key).is_some()
    }

    /// The builder for `key`, creating an empty one on first use.
    pub fn table_builder(&mut self, key: &GroupKey) -> BuilderEntry<'_> {
        match self.tables.entry(key.clone()) {
            Entry::Occupied(occupied) => BuilderEntry::Existing(&mut occupied.into_mut().builder),
            Entry::Vacant(vacant) => {
                trace!("creating table builder for {key}");
                let entry = vacant.insert(CacheEntry {
                    builder: TableBuilder::new(key.clone()),
                    trigger: self.trigger_spec.build(),
                });
                BuilderEntry::Created(&mut entry.builder)
            }
        }
    }

    pub fn builder(&mut self, key: &GroupKey) -> Option<&mut TableBuilder> {
        self.tables.lookup_mut(key).map(|e| &mut e.builder)
    }

    /// The rows accumulated so far for `key`.
    pub fn table(&self, key: &GroupKey) -> Result<BufferedTable> {
        self.tables
            .lookup(key)
            .ok_or_else(|| Error::TableNotFound {
                key: key.to_string(),
            })?
            .builder
            .table()
    }

    pub fn keys(&self) -> Vec<GroupKey> {
        self.tables.keys().cloned().collect()
    }

    /// Visit every builder in key order, stopping at the first error.
    pub fn for_each_builder(
        &mut self,
        mut f: impl FnMut(&GroupKey, &mut TableBuilder) -> Result<()>,
    ) -> Result<()> {
        for (key, entry) in self.tables.iter_mut() {
            f(key, &mut entry.builder)?;
        }
        Ok(())
    }

    /// Clear the rows of `key`, keeping its schema and trigger.
    pub fn discard_table(&mut self, key: &GroupKey) {
        if let Some(entry) = self.tables.lookup_mut(key) {
            entry.builder.clear_data();
        }
    }

    /// Drop `key` entirely; the next request for it creates a fresh builder.
    pub fn expire_table(&mut self, key: &GroupKey) {
        if self.tables.delete(key).is_some() {
            trace!("expired table builder for {key}");
        }
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    /// Evaluate every partition's trigger in key order. Only partitions whose trigger fired or
    /// finished are reported.
    pub fn evaluate_triggers(&mut self, watermark: Time, processing_time: Time) -> Vec<TriggerOutcome> {
        let mut out = Vec::new();
        for (key, entry) in self.tables.iter_mut() {
            let ctx = TriggerContext {
                table: TableContext {
                    key: key.clone(),
                    count: entry.builder.n_rows(),
                },
                watermark,
                current_processing_time: processing_time,
            };
            let fired = entry.trigger.triggered(&ctx);
            let finished = entry.trigger.finished();
            trace!("trigger for {key}: fired={fired} finished={finished}");
            if fired || finished {
                out.push(TriggerOutcome {
                    key: key.clone(),
                    fired,
                    finished,
                });
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColMeta, ColType, Value};

    fn key(n: i64) -> GroupKey {
        GroupKey::new(vec![ColMeta::new("n", ColType::Int)], vec![Value::Int(n)])
    }

    #[test]
    fn second_request_returns_the_same_builder() {
        let mut cache = TableBuilderCache::default();
        let b = cache.table_builder(&key(1));
        assert!(b.is_created());
        let b = b.into_builder();
        b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        b.append_int(0, 7).unwrap();
        let first = b as *const TableBuilder;

        let again = cache.table_builder(&key(1));
        assert!(!again.is_created());
        let again = again.into_builder();
        assert_eq!(again as *const TableBuilder, first);
        assert_eq!(again.n_rows(), 1);
    }

    #[test]
    fn existing_builder_is_a_duplicate_for_single_table_operators() {
        let mut cache = TableBuilderCache::default();
        cache.table_builder(&key(1)).expect_created().unwrap();
        let err = cache.table_builder(&key(1)).expect_created().unwrap_err();
        assert_eq!(err, Error::DuplicateTable { key: "{n=1}".to_string() });
        assert_eq!(err.code(), crate::Code::FailedPrecondition);
    }

    #[test]
    fn discard_keeps_schema_and_expire_resets() {
        let mut cache = TableBuilderCache::default();
        let b = cache.table_builder(&key(1)).into_builder();
        b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        b.append_int(0, 1).unwrap();

        cache.discard_table(&key(1));
        assert_eq!(cache.table(&key(1)).unwrap().n_rows(), 0);
        assert!(!cache.table_builder(&key(1)).is_created());

        cache.expire_table(&key(1));
        assert!(matches!(cache.table(&key(1)), Err(Error::TableNotFound { .. })));
        assert!(cache.table_builder(&key(1)).is_created());
    }

    #[test]
    fn reports_fired_partitions_in_key_order() {
        let mut cache = TableBuilderCache::new(TriggerSpec::AfterAtLeastCount { count: 1 });
        for n in [3, 1, 2] {
            let b = cache.table_builder(&key(n)).into_builder();
            b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
            if n != 2 {
                b.append_int(0, n).unwrap();
            }
        }
        let fired: Vec<GroupKey> = cache
            .evaluate_triggers(Time::EPOCH, Time::EPOCH)
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(fired, vec![key(1), key(3)]);
    }

    #[test]
    fn new_trigger_spec_applies_to_new_partitions_only() {
        let mut cache = TableBuilderCache::new(TriggerSpec::AfterAtLeastCount { count: 1 });
        let spec = TriggerSpec::AfterAtLeastCount { count: 5 };
        for n in [1, 2] {
            if n == 2 {
                cache.set_trigger_spec(spec.clone());
            }
            let b = cache.table_builder(&key(n)).into_builder();
            b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
            b.append_int(0, n).unwrap();
        }
        assert_eq!(cache.trigger_spec(), &spec);
        let fired: Vec<GroupKey> = cache
            .evaluate_triggers(Time::EPOCH, Time::EPOCH)
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(fired, vec![key(1)]);
    }

    #[test]
    fn for_each_builder_visits_in_key_order_and_stops_on_error() {
        let mut cache = TableBuilderCache::default();
        for n in [2, 1, 3] {
            let b = cache.table_builder(&key(n)).into_builder();
            b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        }
        let mut visited = Vec::new();
        let err = cache
            .for_each_builder(|k, b| {
                visited.push(k.clone());
                if k == &key(2) {
                    return Err(Error::Canceled);
                }
                b.append_int(0, 1)
            })
            .unwrap_err();
        assert_eq!(err, Error::Canceled);
        assert_eq!(visited, vec![key(1), key(2)]);
        assert_eq!(cache.table(&key(1)).unwrap().n_rows(), 1);
        assert_eq!(cache.table(&key(3)).unwrap().n_rows(), 0);
    }
}
