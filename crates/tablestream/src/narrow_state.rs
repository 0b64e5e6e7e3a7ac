//! Narrow transformations that carry state per group key from one chunk to the next.

use log::trace;

use crate::dataset::{DatasetId, TransportDataset};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::{ColReader, Table};
use crate::time::Time;
use crate::transformation::Transformation;

/// Per-chunk logic of a stateful narrow transformation.
pub trait NarrowStateProcessor<S>: Send {
    /// Handle `chunk` given the state its key ended the previous chunk with. The returned state
    /// is kept for the next chunk of the same key; `None` discards it.
    fn process_chunk(
        &mut self,
        chunk: &ColReader,
        state: Option<S>,
        d: &mut TransportDataset<S>,
    ) -> Result<Option<S>>;

    /// Called once, after downstream has been finished.
    fn close(&mut self) {}
}

/// Adapts a [`NarrowStateProcessor`] to the full protocol.
///
/// A whole table is processed chunk by chunk and then its key is flushed: the key's state is
/// disposed and downstream is told the key is complete. Finishing disposes whatever state is
/// left and then closes the processor. A processing error finishes downstream with that error.
pub struct NarrowStateTransformation<P, S> {
    processor: P,
    d: TransportDataset<S>,
    finished: bool,
}

impl<P, S> NarrowStateTransformation<P, S>
where
    P: NarrowStateProcessor<S>,
    S: Send,
{
    pub fn new(processor: P, d: TransportDataset<S>) -> Self {
        Self {
            processor,
            d,
            finished: false,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn dataset(&self) -> &TransportDataset<S> {
        &self.d
    }

    /// Feed one chunk without flushing its key.
    pub fn process_chunk(&mut self, cr: &ColReader) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let result = self.run_chunk(cr);
        self.or_fail(result)
    }

    fn run_chunk(&mut self, cr: &ColReader) -> Result<()> {
        let state = self.d.delete(cr.key());
        if let Some(next) = self.processor.process_chunk(cr, state, &mut self.d)? {
            self.d.set(cr.key().clone(), next);
        }
        Ok(())
    }

    fn flush(&mut self, key: &GroupKey) -> Result<()> {
        if self.d.delete(key).is_some() {
            trace!("disposed state for {key} in dataset {}", self.d.id());
        }
        self.d.flush_key(key)
    }

    fn or_fail(&mut self, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            self.close(Some(err.clone()));
        }
        result
    }

    fn close(&mut self, err: Option<Error>) {
        self.finished = true;
        self.d.finish(err);
        self.processor.close();
    }
}

impl<P, S> Transformation for NarrowStateTransformation<P, S>
where
    P: NarrowStateProcessor<S>,
    S: Send,
{
    fn process(&mut self, _parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let key = table.key().clone();
        let mut result = table.do_chunks(&mut |cr| self.run_chunk(cr));
        if result.is_ok() {
            result = self.flush(&key);
        }
        self.or_fail(result)
    }

    fn retract_table(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.d.delete(&key);
        self.d.retract_table(&key)
    }

    fn update_watermark(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.d.update_watermark(t)
    }

    fn update_processing_time(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.d.update_processing_time(t)
    }

    fn flush_key(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let result = self.flush(&key);
        self.or_fail(result)
    }

    fn finish(&mut self, _parent: DatasetId, err: Option<Error>) {
        if self.finished {
            return;
        }
        self.close(err);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builder::TableBuilder;
    use crate::collect::ResultCollector;
    use crate::table::BufferedTable;
    use crate::types::{ColMeta, ColType, Value};

    /// Rows seen so far for one key. Dropping it counts as disposal.
    struct Count {
        rows: usize,
        disposed: Arc<AtomicUsize>,
    }

    impl Drop for Count {
        fn drop(&mut self) {
            self.disposed.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Passes chunks through and records the state each chunk arrived with.
    struct RunningCount {
        disposed: Arc<AtomicUsize>,
        seen: Vec<Option<usize>>,
        closed: bool,
    }

    impl NarrowStateProcessor<Count> for RunningCount {
        fn process_chunk(
            &mut self,
            chunk: &ColReader,
            state: Option<Count>,
            d: &mut TransportDataset<Count>,
        ) -> Result<Option<Count>> {
            self.seen.push(state.as_ref().map(|s| s.rows));
            let mut state = state.unwrap_or_else(|| Count {
                rows: 0,
                disposed: self.disposed.clone(),
            });
            state.rows += chunk.len();
            d.process_chunk(chunk)?;
            Ok(Some(state))
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn key() -> GroupKey {
        GroupKey::new(vec![ColMeta::new("t0", ColType::String)], vec![Value::from("a")])
    }

    fn table(values: &[i64]) -> BufferedTable {
        let mut b = TableBuilder::new(key());
        b.add_col(ColMeta::new("t0", ColType::String)).unwrap();
        b.add_col(ColMeta::new("_value", ColType::Int)).unwrap();
        for &v in values {
            b.append_string(0, "a").unwrap();
            b.append_int(1, v).unwrap();
        }
        b.table().unwrap()
    }

    fn chunk(values: &[i64]) -> ColReader {
        table(values).chunks()[0].clone()
    }

    fn stateful() -> (
        NarrowStateTransformation<RunningCount, Count>,
        ResultCollector,
        Arc<AtomicUsize>,
    ) {
        let disposed = Arc::new(AtomicUsize::new(0));
        let mut d = TransportDataset::new(DatasetId::from_node_id("running"));
        let sink = ResultCollector::new();
        d.add_transformation(Box::new(sink.clone()));
        let processor = RunningCount {
            disposed: disposed.clone(),
            seen: Vec::new(),
            closed: false,
        };
        (NarrowStateTransformation::new(processor, d), sink, disposed)
    }

    #[test]
    fn state_carries_over_between_chunks() {
        let (mut t, sink, disposed) = stateful();
        t.process_chunk(&chunk(&[1, 2])).unwrap();
        t.process_chunk(&chunk(&[3, 4])).unwrap();

        assert_eq!(t.processor().seen, vec![None, Some(2)]);
        assert_eq!(t.dataset().lookup(&key()).map(|s| s.rows), Some(4));
        assert_eq!(disposed.load(Ordering::SeqCst), 0);
        assert!(sink.tables().is_empty());
    }

    #[test]
    fn flush_key_disposes_state() {
        let (mut t, sink, disposed) = stateful();
        let parent = DatasetId::new_random();
        t.process(parent, Box::new(table(&[1, 2]))).unwrap();
        t.process(parent, Box::new(table(&[3]))).unwrap();

        assert_eq!(t.processor().seen, vec![None, None]);
        assert!(t.dataset().lookup(&key()).is_none());
        assert_eq!(disposed.load(Ordering::SeqCst), 2);
        assert_eq!(sink.keys(), vec![key(), key()]);
        assert_eq!(
            sink.tables()[0].rows(),
            vec![
                vec![Value::from("a"), Value::Int(1)],
                vec![Value::from("a"), Value::Int(2)],
            ]
        );
        assert_eq!(sink.flushed_keys(), vec![key(), key()]);
    }

    #[test]
    fn finish_disposes_state_and_closes() {
        let (mut t, sink, disposed) = stateful();
        let parent = DatasetId::new_random();
        t.process_chunk(&chunk(&[1])).unwrap();
        t.finish(parent, Some(Error::Canceled));
        t.finish(parent, None);

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert!(t.processor().closed);
        assert!(sink.tables().is_empty());
        assert_eq!(sink.error(), Some(Error::Canceled));
        assert_eq!(sink.finish_count(), 1);
    }

    #[test]
    fn clean_finish_sends_unflushed_chunks() {
        let (mut t, sink, disposed) = stateful();
        t.process_chunk(&chunk(&[1])).unwrap();
        t.process_chunk(&chunk(&[2])).unwrap();
        t.finish(DatasetId::new_random(), None);

        assert_eq!(disposed.load(Ordering::SeqCst), 1);
        assert_eq!(sink.tables().len(), 1);
        assert_eq!(sink.tables()[0].n_rows(), 2);
        assert!(sink.flushed_keys().is_empty());
        assert_eq!(sink.error(), None);
    }

    #[test]
    fn processor_error_finishes_downstream() {
        struct Failing;

        impl NarrowStateProcessor<()> for Failing {
            fn process_chunk(
                &mut self,
                chunk: &ColReader,
                _state: Option<()>,
                _d: &mut TransportDataset<()>,
            ) -> Result<Option<()>> {
                chunk.floats(1).map(|_| None)
            }
        }

        let mut d = TransportDataset::new(DatasetId::new_random());
        let sink = ResultCollector::new();
        d.add_transformation(Box::new(sink.clone()));
        let mut t = NarrowStateTransformation::new(Failing, d);
        let parent = DatasetId::new_random();

        let err = t.process(parent, Box::new(table(&[1]))).unwrap_err();
        assert!(matches!(err, Error::ColumnTypeMismatch { .. }));
        assert_eq!(sink.error(), Some(err));

        t.update_watermark(parent, Time::from_secs(1)).unwrap();
        t.process(parent, Box::new(table(&[2]))).unwrap();
        assert!(sink.watermarks().is_empty());
        assert!(sink.flushed_keys().is_empty());
        assert_eq!(sink.finish_count(), 1);
    }
}
