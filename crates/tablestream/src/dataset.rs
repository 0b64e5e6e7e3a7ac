//! Datasets own a transformation's output and push it downstream.

use std::fmt;

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cache::TableBuilderCache;
use crate::config::AccumulationMode;
use crate::context::{CancellationToken, ExecutionContext};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::group_lookup::GroupLookup;
use crate::table::{BufferedTable, ColReader, Table};
use crate::time::Time;
use crate::transformation::{Transformation, TransformationSet};

/// Identity of a dataset within one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DatasetId(Uuid);

impl DatasetId {
    pub fn new_random() -> Self {
        DatasetId(Uuid::new_v4())
    }

    /// Stable id for the dataset produced by plan node `node_id`.
    pub fn from_node_id(node_id: &str) -> Self {
        DatasetId(Uuid::new_v5(&Uuid::NAMESPACE_OID, node_id.as_bytes()))
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        DatasetId(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// The output side of a stateful transformation.
///
/// The transformation fills per-partition builders through [`Dataset::cache_mut`]. The dataset
/// decides when each partition is sent: whenever time advances it evaluates the partition's
/// trigger, and on a clean finish it sends everything that is left.
pub struct Dataset {
    id: DatasetId,
    cache: TableBuilderCache,
    ts: TransformationSet,
    accumulation_mode: AccumulationMode,
    watermark: Time,
    processing_time: Time,
    cancel: CancellationToken,
    finished: bool,
}

impl Dataset {
    pub fn new(id: DatasetId, ctx: &ExecutionContext) -> Self {
        Self {
            id,
            cache: TableBuilderCache::new(ctx.options.trigger.clone()),
            ts: TransformationSet::new(),
            accumulation_mode: ctx.options.accumulation_mode,
            watermark: Time::MIN,
            processing_time: Time::MIN,
            cancel: ctx.cancel.clone(),
            finished: false,
        }
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn add_transformation(&mut self, t: Box<dyn Transformation>) {
        self.ts.push(t);
    }

    pub fn cache(&self) -> &TableBuilderCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TableBuilderCache {
        &mut self.cache
    }

    pub fn watermark(&self) -> Time {
        self.watermark
    }

    pub fn processing_time(&self) -> Time {
        self.processing_time
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Whether a message arriving now comes too late. Once finished, a dataset ignores
    /// everything it is sent.
    fn ignore(&self, what: &str) -> bool {
        if self.finished {
            warn!("dataset {} ignoring {what} after finish", self.id);
        }
        self.finished
    }

    /// Drop the rows of `key` and tell downstream to forget what it received for it.
    pub fn retract_table(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("retraction") {
            return Ok(());
        }
        self.cancel.check()?;
        self.cache.discard_table(key);
        self.ts.retract_table(self.id, key)
    }

    pub fn update_watermark(&mut self, t: Time) -> Result<()> {
        if self.ignore("watermark") {
            return Ok(());
        }
        self.cancel.check()?;
        self.watermark = self.watermark.max(t);
        self.eval_triggers()?;
        self.ts.update_watermark(self.id, t)
    }

    pub fn update_processing_time(&mut self, t: Time) -> Result<()> {
        if self.ignore("processing time") {
            return Ok(());
        }
        self.cancel.check()?;
        self.processing_time = self.processing_time.max(t);
        self.eval_triggers()?;
        self.ts.update_processing_time(self.id, t)
    }

    /// Send `key` downstream now, whatever its trigger says.
    pub fn trigger_table(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("trigger") {
            return Ok(());
        }
        self.flush_table(key)
    }

    fn flush_table(&mut self, key: &GroupKey) -> Result<()> {
        match self.accumulation_mode {
            AccumulationMode::Discarding => {
                let table = self.cache.table(key)?;
                debug!("flushing {} rows for {key} from dataset {}", table.n_rows(), self.id);
                self.ts.process(self.id, Box::new(table))?;
                self.cache.discard_table(key);
                Ok(())
            }
            AccumulationMode::Accumulating => {
                Err(Error::Unimplemented("accumulating mode".to_string()))
            }
        }
    }

    fn eval_triggers(&mut self) -> Result<()> {
        let outcomes = self
            .cache
            .evaluate_triggers(self.watermark, self.processing_time);
        for outcome in outcomes {
            self.cancel.check()?;
            if outcome.fired {
                self.flush_table(&outcome.key)?;
            }
            if outcome.finished {
                debug!("expiring {} from dataset {}", outcome.key, self.id);
                self.cache.expire_table(&outcome.key);
            }
        }
        Ok(())
    }

    fn flush_all(&mut self) -> Result<()> {
        for key in self.cache.keys() {
            self.cancel.check()?;
            self.flush_table(&key)?;
            self.cache.expire_table(&key);
        }
        Ok(())
    }

    /// Drain the cache into downstream (unless `err` is set) and finish downstream exactly once.
    /// A failure while draining becomes the error downstream sees.
    pub fn finish(&mut self, err: Option<Error>) {
        if self.finished {
            warn!("dataset {} finished twice", self.id);
            return;
        }
        self.finished = true;
        let err = match err {
            Some(err) => Some(err),
            None => self.flush_all().err(),
        };
        self.cache.clear();
        self.ts.finish(self.id, err);
    }
}

/// The output side of a transformation that emits every table as soon as it is built.
pub struct PassthroughDataset {
    id: DatasetId,
    ts: TransformationSet,
    finished: bool,
}

impl PassthroughDataset {
    pub fn new(id: DatasetId) -> Self {
        Self {
            id,
            ts: TransformationSet::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn add_transformation(&mut self, t: Box<dyn Transformation>) {
        self.ts.push(t);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ignore(&self, what: &str) -> bool {
        if self.finished {
            warn!("dataset {} ignoring {what} after finish", self.id);
        }
        self.finished
    }

    pub fn process(&mut self, table: Box<dyn Table>) -> Result<()> {
        if self.ignore("table") {
            return Ok(());
        }
        self.ts.process(self.id, table)
    }

    pub fn retract_table(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("retraction") {
            return Ok(());
        }
        self.ts.retract_table(self.id, key)
    }

    pub fn update_watermark(&mut self, t: Time) -> Result<()> {
        if self.ignore("watermark") {
            return Ok(());
        }
        self.ts.update_watermark(self.id, t)
    }

    pub fn update_processing_time(&mut self, t: Time) -> Result<()> {
        if self.ignore("processing time") {
            return Ok(());
        }
        self.ts.update_processing_time(self.id, t)
    }

    pub fn flush_key(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("flush") {
            return Ok(());
        }
        self.ts.flush_key(self.id, key)
    }

    pub fn finish(&mut self, err: Option<Error>) {
        if self.finished {
            warn!("dataset {} finished twice", self.id);
            return;
        }
        self.finished = true;
        self.ts.finish(self.id, err);
    }
}

/// The output side of a transformation that keeps per-partition state `S` between chunks.
///
/// Chunks handed to [`TransportDataset::process_chunk`] are buffered per key until the key is
/// flushed, at which point they go downstream as one table followed by the flush itself.
/// Anything still buffered at a clean finish is sent before downstream is finished.
pub struct TransportDataset<S> {
    id: DatasetId,
    ts: TransformationSet,
    state: GroupLookup<S>,
    pending: GroupLookup<BufferedTable>,
    finished: bool,
}

impl<S> TransportDataset<S> {
    pub fn new(id: DatasetId) -> Self {
        Self {
            id,
            ts: TransformationSet::new(),
            state: GroupLookup::new(),
            pending: GroupLookup::new(),
            finished: false,
        }
    }

    pub fn id(&self) -> DatasetId {
        self.id
    }

    pub fn add_transformation(&mut self, t: Box<dyn Transformation>) {
        self.ts.push(t);
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn ignore(&self, what: &str) -> bool {
        if self.finished {
            warn!("dataset {} ignoring {what} after finish", self.id);
        }
        self.finished
    }

    pub fn lookup(&self, key: &GroupKey) -> Option<&S> {
        self.state.lookup(key)
    }

    pub fn lookup_mut(&mut self, key: &GroupKey) -> Option<&mut S> {
        self.state.lookup_mut(key)
    }

    /// The state for `key`, created with `f` if there is none yet.
    pub fn lookup_or_create(&mut self, key: &GroupKey, f: impl FnOnce() -> S) -> &mut S {
        self.state.entry(key.clone()).or_insert_with(f)
    }

    pub fn set(&mut self, key: GroupKey, state: S) {
        self.state.set(key, state);
    }

    /// Remove and return the state for `key`. Dropping it disposes it.
    pub fn delete(&mut self, key: &GroupKey) -> Option<S> {
        self.state.delete(key)
    }

    /// Visit every state in key order, stopping at the first error.
    pub fn for_each(&mut self, mut f: impl FnMut(&GroupKey, &mut S) -> Result<()>) -> Result<()> {
        for (key, state) in self.state.iter_mut() {
            f(key, state)?;
        }
        Ok(())
    }

    /// Buffer one output chunk under its key.
    pub fn process_chunk(&mut self, cr: &ColReader) -> Result<()> {
        if self.ignore("chunk") {
            return Ok(());
        }
        let buffer = self
            .pending
            .entry(cr.key().clone())
            .or_insert_with(|| BufferedTable::with_schema(cr.key().clone(), cr.schema()));
        if cr.is_empty() {
            return Ok(());
        }
        buffer.push_chunk(cr.clone())
    }

    /// Send the rows buffered for `key`, then tell downstream that `key` is complete.
    pub fn flush_key(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("flush") {
            return Ok(());
        }
        if let Some(table) = self.pending.delete(key) {
            trace!("flushing {} rows for {key} from dataset {}", table.n_rows(), self.id);
            self.ts.process(self.id, Box::new(table))?;
        }
        self.ts.flush_key(self.id, key)
    }

    pub fn retract_table(&mut self, key: &GroupKey) -> Result<()> {
        if self.ignore("retraction") {
            return Ok(());
        }
        self.pending.delete(key);
        self.ts.retract_table(self.id, key)
    }

    pub fn update_watermark(&mut self, t: Time) -> Result<()> {
        if self.ignore("watermark") {
            return Ok(());
        }
        self.ts.update_watermark(self.id, t)
    }

    pub fn update_processing_time(&mut self, t: Time) -> Result<()> {
        if self.ignore("processing time") {
            return Ok(());
        }
        self.ts.update_processing_time(self.id, t)
    }

    fn flush_pending(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        for table in pending.into_values() {
            self.ts.process(self.id, Box::new(table))?;
        }
        Ok(())
    }

    /// Send what is still buffered (unless `err` is set), dispose every state and finish
    /// downstream exactly once.
    pub fn finish(&mut self, err: Option<Error>) {
        if self.finished {
            warn!("dataset {} finished twice", self.id);
            return;
        }
        self.finished = true;
        let err = match err {
            Some(err) => Some(err),
            None => self.flush_pending().err(),
        };
        self.pending.clear();
        self.state.clear();
        self.ts.finish(self.id, err);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builder::append_key_values;
    use crate::collect::ResultCollector;
    use crate::config::ExecuteOptions;
    use crate::table::{DEFAULT_START_COL_LABEL, DEFAULT_STOP_COL_LABEL};
    use crate::trigger::TriggerSpec;
    use crate::types::{ColMeta, ColType, Value};

    fn window_key(start: i64, stop: i64) -> GroupKey {
        GroupKey::new(
            vec![
                ColMeta::new(DEFAULT_START_COL_LABEL, ColType::Time),
                ColMeta::new(DEFAULT_STOP_COL_LABEL, ColType::Time),
            ],
            vec![
                Value::Time(Time::from_nanos(start)),
                Value::Time(Time::from_nanos(stop)),
            ],
        )
    }

    fn fill(d: &mut Dataset, key: &GroupKey, rows: usize) {
        let b = d.cache_mut().table_builder(key).into_builder();
        if b.n_cols() == 0 {
            crate::builder::add_table_key_cols(key, b).unwrap();
        }
        for _ in 0..rows {
            append_key_values(key, b).unwrap();
        }
    }

    fn dataset(options: ExecuteOptions) -> (Dataset, ResultCollector) {
        let ctx = ExecutionContext::new(options);
        let mut d = Dataset::new(DatasetId::from_node_id("window0"), &ctx);
        let collector = ResultCollector::new();
        d.add_transformation(Box::new(collector.clone()));
        (d, collector)
    }

    #[test]
    fn node_ids_are_stable() {
        assert_eq!(DatasetId::from_node_id("a"), DatasetId::from_node_id("a"));
        assert_ne!(DatasetId::from_node_id("a"), DatasetId::from_node_id("b"));
        assert_ne!(DatasetId::new_random(), DatasetId::new_random());
    }

    #[test]
    fn watermark_flushes_closed_windows_only() {
        let (mut d, out) = dataset(ExecuteOptions::default());
        fill(&mut d, &window_key(0, 10), 2);
        fill(&mut d, &window_key(10, 20), 1);

        d.update_watermark(Time::from_nanos(15)).unwrap();
        assert_eq!(out.keys(), vec![window_key(0, 10)]);
        assert_eq!(out.watermarks(), vec![Time::from_nanos(15)]);
        assert!(!d.cache().contains(&window_key(0, 10)));
        assert!(d.cache().contains(&window_key(10, 20)));

        d.finish(None);
        assert_eq!(out.keys(), vec![window_key(0, 10), window_key(10, 20)]);
        assert_eq!(out.finish_count(), 1);
        assert_eq!(out.error(), None);
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let (mut d, _out) = dataset(ExecuteOptions::default());
        d.update_watermark(Time::from_nanos(20)).unwrap();
        d.update_watermark(Time::from_nanos(5)).unwrap();
        assert_eq!(d.watermark(), Time::from_nanos(20));
    }

    #[test]
    fn count_trigger_fires_on_processing_time() {
        let options = ExecuteOptions::default().with_trigger(TriggerSpec::Repeated {
            trigger: Box::new(TriggerSpec::AfterAtLeastCount { count: 2 }),
        });
        let (mut d, out) = dataset(options);
        let key = window_key(0, 10);
        fill(&mut d, &key, 1);
        d.update_processing_time(Time::from_nanos(1)).unwrap();
        assert!(out.tables().is_empty());

        fill(&mut d, &key, 1);
        d.update_processing_time(Time::from_nanos(2)).unwrap();
        assert_eq!(out.tables().len(), 1);
        assert_eq!(out.tables()[0].n_rows(), 2);
        assert!(d.cache().contains(&key));
        assert_eq!(d.cache().table(&key).unwrap().n_rows(), 0);
    }

    #[test]
    fn error_finish_skips_flush() {
        let (mut d, out) = dataset(ExecuteOptions::default());
        fill(&mut d, &window_key(0, 10), 1);
        d.finish(Some(Error::Canceled));
        d.finish(None);
        assert!(out.tables().is_empty());
        assert_eq!(out.finish_count(), 1);
        assert_eq!(out.error(), Some(Error::Canceled));
    }

    #[test]
    fn accumulating_mode_is_unimplemented() {
        let options = ExecuteOptions {
            accumulation_mode: AccumulationMode::Accumulating,
            ..ExecuteOptions::default()
        };
        let (mut d, out) = dataset(options);
        fill(&mut d, &window_key(0, 10), 1);
        d.finish(None);
        assert_eq!(
            out.error().map(|e| e.code()),
            Some(crate::Code::Unimplemented)
        );
    }

    #[test]
    fn canceled_context_stops_time_updates() {
        let ctx = ExecutionContext::default();
        let mut d = Dataset::new(DatasetId::new_random(), &ctx);
        ctx.cancel.cancel();
        assert_eq!(d.update_watermark(Time::EPOCH), Err(Error::Canceled));
    }

    #[test]
    fn finished_dataset_ignores_later_messages() {
        let (mut d, out) = dataset(ExecuteOptions::default());
        d.finish(None);
        fill(&mut d, &window_key(0, 10), 2);
        d.update_watermark(Time::from_nanos(15)).unwrap();
        d.update_processing_time(Time::from_nanos(15)).unwrap();
        d.trigger_table(&window_key(0, 10)).unwrap();
        d.retract_table(&window_key(0, 10)).unwrap();

        assert!(out.tables().is_empty());
        assert!(out.watermarks().is_empty());
        assert!(out.processing_times().is_empty());
        assert!(out.retractions().is_empty());
        assert_eq!(d.watermark(), Time::MIN);
        assert_eq!(out.finish_count(), 1);
    }

    #[test]
    fn retraction_discards_rows_and_forwards() {
        let (mut d, out) = dataset(ExecuteOptions::default());
        let key = window_key(0, 10);
        fill(&mut d, &key, 3);
        d.retract_table(&key).unwrap();
        assert_eq!(d.cache().table(&key).unwrap().n_rows(), 0);
        assert_eq!(out.retractions(), vec![key]);
    }

    #[test]
    fn passthrough_ignores_messages_after_finish() {
        let mut d = PassthroughDataset::new(DatasetId::from_node_id("map0"));
        let out = ResultCollector::new();
        d.add_transformation(Box::new(out.clone()));
        d.finish(None);
        d.process(Box::new(crate::table::EmptyTable::new(GroupKey::empty(), Vec::new())))
            .unwrap();
        d.update_watermark(Time::from_nanos(1)).unwrap();
        d.flush_key(&GroupKey::empty()).unwrap();
        assert!(out.tables().is_empty());
        assert!(out.watermarks().is_empty());
        assert!(out.flushed_keys().is_empty());
        assert_eq!(out.finish_count(), 1);
    }

    fn transport() -> (TransportDataset<usize>, ResultCollector) {
        let mut d = TransportDataset::new(DatasetId::from_node_id("state0"));
        let out = ResultCollector::new();
        d.add_transformation(Box::new(out.clone()));
        (d, out)
    }

    #[test]
    fn transport_state_is_kept_per_key() {
        let (mut d, _out) = transport();
        let (a, b) = (window_key(0, 10), window_key(10, 20));
        *d.lookup_or_create(&a, || 1) += 1;
        *d.lookup_or_create(&a, || 100) += 1;
        d.set(b.clone(), 7);

        let mut seen = Vec::new();
        d.for_each(|key, state| {
            seen.push((key.clone(), *state));
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![(a.clone(), 3), (b.clone(), 7)]);
        assert_eq!(d.delete(&a), Some(3));
        assert_eq!(d.lookup(&a), None);
        assert_eq!(d.lookup_mut(&b).copied(), Some(7));
    }

    #[test]
    fn transport_flush_sends_buffered_rows_then_the_key() {
        let (mut d, out) = transport();
        let key = window_key(0, 10);
        let empty = ColReader::empty(key.clone(), vec![ColMeta::new("v", ColType::Int)].into());
        d.process_chunk(&empty).unwrap();
        d.flush_key(&key).unwrap();
        d.flush_key(&key).unwrap();

        assert_eq!(out.keys(), vec![key.clone()]);
        assert_eq!(out.tables()[0].n_rows(), 0);
        assert_eq!(out.tables()[0].cols(), &[ColMeta::new("v", ColType::Int)]);
        assert_eq!(out.flushed_keys(), vec![key.clone(), key]);
    }

    #[test]
    fn transport_retraction_drops_buffered_rows() {
        let (mut d, out) = transport();
        let key = window_key(0, 10);
        let empty = ColReader::empty(key.clone(), vec![ColMeta::new("v", ColType::Int)].into());
        d.process_chunk(&empty).unwrap();
        d.retract_table(&key).unwrap();
        d.finish(None);
        d.finish(None);

        assert!(out.tables().is_empty());
        assert_eq!(out.retractions(), vec![key]);
        assert_eq!(out.finish_count(), 1);
        assert!(d.is_finished());
    }
}
