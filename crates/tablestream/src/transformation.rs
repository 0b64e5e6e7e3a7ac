//! The push protocol every operator implements.

use std::fmt;

use log::trace;

use crate::dataset::{DatasetId, PassthroughDataset};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::{copy_table, Table};
use crate::time::Time;

/// A node receiving tables and progress messages from one or more parent datasets.
///
/// Per parent, a transformation sees zero or more `process`/`retract_table` calls followed by
/// exactly one `finish`. Calls are synchronous: a parent issues the next message only after the
/// previous call returned.
pub trait Transformation: Send {
    /// Consume one table from `parent`. Zero-length chunks must be accepted.
    fn process(&mut self, parent: DatasetId, table: Box<dyn Table>) -> Result<()>;

    /// Invalidate a partition previously emitted by `parent`.
    fn retract_table(&mut self, parent: DatasetId, key: GroupKey) -> Result<()>;

    /// `parent` will send no more rows with event time at or before `t`.
    fn update_watermark(&mut self, parent: DatasetId, t: Time) -> Result<()>;

    fn update_processing_time(&mut self, parent: DatasetId, t: Time) -> Result<()>;

    /// `parent` has sent everything it will send for `key`.
    fn flush_key(&mut self, _parent: DatasetId, _key: GroupKey) -> Result<()> {
        Ok(())
    }

    /// Terminal message from `parent`, carrying its error if it failed.
    fn finish(&mut self, parent: DatasetId, err: Option<Error>);
}

/// One protocol message, as carried across a fan-in channel.
pub enum Message {
    Process(Box<dyn Table>),
    RetractTable(GroupKey),
    UpdateWatermark(Time),
    UpdateProcessingTime(Time),
    FlushKey(GroupKey),
    Finish(Option<Error>),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Process(_) => "process",
            Message::RetractTable(_) => "retract_table",
            Message::UpdateWatermark(_) => "update_watermark",
            Message::UpdateProcessingTime(_) => "update_processing_time",
            Message::FlushKey(_) => "flush_key",
            Message::Finish(_) => "finish",
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self, Message::Finish(_))
    }

    /// Deliver the message to `t` as if `parent` had called it directly.
    pub fn dispatch(self, parent: DatasetId, t: &mut dyn Transformation) -> Result<()> {
        trace!("dispatching {} from {parent}", self.kind());
        match self {
            Message::Process(table) => t.process(parent, table),
            Message::RetractTable(key) => t.retract_table(parent, key),
            Message::UpdateWatermark(time) => t.update_watermark(parent, time),
            Message::UpdateProcessingTime(time) => t.update_processing_time(parent, time),
            Message::FlushKey(key) => t.flush_key(parent, key),
            Message::Finish(err) => {
                t.finish(parent, err);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Process(table) => write!(f, "Process({})", table.key()),
            Message::RetractTable(key) => write!(f, "RetractTable({key})"),
            Message::UpdateWatermark(t) => write!(f, "UpdateWatermark({t})"),
            Message::UpdateProcessingTime(t) => write!(f, "UpdateProcessingTime({t})"),
            Message::FlushKey(key) => write!(f, "FlushKey({key})"),
            Message::Finish(err) => write!(f, "Finish({err:?})"),
        }
    }
}

/// The downstream transformations of a dataset.
#[derive(Default)]
pub struct TransformationSet {
    transformations: Vec<Box<dyn Transformation>>,
}

impl TransformationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, t: Box<dyn Transformation>) {
        self.transformations.push(t);
    }

    pub fn len(&self) -> usize {
        self.transformations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transformations.is_empty()
    }

    /// Hand `table` to every downstream transformation. With several receivers the table is read
    /// once and each receives its own copy.
    pub fn process(&mut self, id: DatasetId, table: Box<dyn Table>) -> Result<()> {
        match self.transformations.as_mut_slice() {
            [] => Ok(()),
            [only] => only.process(id, table),
            many => {
                let buffered = copy_table(table)?;
                for t in many {
                    t.process(id, Box::new(buffered.clone()))?;
                }
                Ok(())
            }
        }
    }

    pub fn retract_table(&mut self, id: DatasetId, key: &GroupKey) -> Result<()> {
        for t in &mut self.transformations {
            t.retract_table(id, key.clone())?;
        }
        Ok(())
    }

    pub fn update_watermark(&mut self, id: DatasetId, time: Time) -> Result<()> {
        for t in &mut self.transformations {
            t.update_watermark(id, time)?;
        }
        Ok(())
    }

    pub fn update_processing_time(&mut self, id: DatasetId, time: Time) -> Result<()> {
        for t in &mut self.transformations {
            t.update_processing_time(id, time)?;
        }
        Ok(())
    }

    pub fn flush_key(&mut self, id: DatasetId, key: &GroupKey) -> Result<()> {
        for t in &mut self.transformations {
            t.flush_key(id, key.clone())?;
        }
        Ok(())
    }

    pub fn finish(&mut self, id: DatasetId, err: Option<Error>) {
        for t in &mut self.transformations {
            t.finish(id, err.clone());
        }
    }
}

/// Per-table logic of a transformation that emits output as soon as each input table is read.
pub trait NarrowProcessor: Send {
    fn process(&mut self, table: Box<dyn Table>, d: &mut PassthroughDataset) -> Result<()>;
}

/// Adapts a [`NarrowProcessor`] to the full protocol: progress messages and retractions pass
/// straight through, and a processing error finishes downstream with that error.
pub struct NarrowTransformation<P> {
    processor: P,
    d: PassthroughDataset,
    finished: bool,
}

impl<P: NarrowProcessor> NarrowTransformation<P> {
    pub fn new(processor: P, d: PassthroughDataset) -> Self {
        Self {
            processor,
            d,
            finished: false,
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }
}

impl<P: NarrowProcessor> Transformation for NarrowTransformation<P> {
    fn process(&mut self, _parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        match self.processor.process(table, &mut self.d) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.finished = true;
                self.d.finish(Some(err.clone()));
                Err(err)
            }
        }
    }

    fn retract_table(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        if self.finished {
            return Ok(());
        }
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
        self.d.flush_key(&key)
    }

    fn finish(&mut self, _parent: DatasetId, err: Option<Error>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.d.finish(err);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::builder::{add_table_cols, append_record, TableBuilder};
    use crate::collect::ResultCollector;
    use crate::types::{ColMeta, ColType, Value};

    /// Keeps rows whose `v` is positive.
    struct Positive;

    impl NarrowProcessor for Positive {
        fn process(&mut self, table: Box<dyn Table>, d: &mut PassthroughDataset) -> Result<()> {
            let mut b = TableBuilder::new(table.key().clone());
            add_table_cols(table.cols(), &mut b)?;
            table.do_chunks(&mut |cr| {
                let values = cr.ints(0)?;
                for i in 0..cr.len() {
                    if values.get(i).is_some_and(|&v| v > 0) {
                        append_record(i, cr, &mut b)?;
                    }
                }
                Ok(())
            })?;
            d.process(Box::new(b.table()?))
        }
    }

    fn ints(values: &[i64]) -> Box<dyn Table> {
        let mut b = TableBuilder::new(GroupKey::empty());
        b.add_col(ColMeta::new("v", ColType::Int)).unwrap();
        for &v in values {
            b.append_int(0, v).unwrap();
        }
        Box::new(b.table().unwrap())
    }

    fn narrow() -> (NarrowTransformation<Positive>, ResultCollector, ResultCollector) {
        let mut d = PassthroughDataset::new(DatasetId::from_node_id("filter"));
        let (a, b) = (ResultCollector::new(), ResultCollector::new());
        d.add_transformation(Box::new(a.clone()));
        d.add_transformation(Box::new(b.clone()));
        (NarrowTransformation::new(Positive, d), a, b)
    }

    #[test]
    fn narrow_output_reaches_every_downstream() {
        let (mut t, a, b) = narrow();
        let parent = DatasetId::new_random();
        t.process(parent, ints(&[3, -1, 4])).unwrap();
        t.update_watermark(parent, Time::from_secs(5)).unwrap();
        t.finish(parent, None);
        t.finish(parent, None);

        for sink in [a, b] {
            assert_eq!(sink.tables()[0].rows(), vec![vec![Value::Int(3)], vec![Value::Int(4)]]);
            assert_eq!(sink.watermarks(), vec![Time::from_secs(5)]);
            assert_eq!(sink.finish_count(), 1);
        }
    }

    #[test]
    fn narrow_error_finishes_downstream() {
        let (mut t, a, _b) = narrow();
        let parent = DatasetId::new_random();
        let mut wrong = TableBuilder::new(GroupKey::empty());
        wrong.add_col(ColMeta::new("v", ColType::String)).unwrap();
        wrong.append_string(0, "x").unwrap();
        let err = t
            .process(parent, Box::new(wrong.table().unwrap()))
            .unwrap_err();
        assert!(matches!(err, Error::ColumnTypeMismatch { .. }));
        assert_eq!(a.error(), Some(err));

        t.process(parent, ints(&[1])).unwrap();
        t.finish(parent, None);
        assert!(a.tables().is_empty());
        assert_eq!(a.finish_count(), 1);
    }

    #[test]
    fn message_dispatch_routes_to_the_matching_call() {
        let mut sink = ResultCollector::new();
        let parent = DatasetId::new_random();
        let key = GroupKey::empty();
        for m in [
            Message::RetractTable(key.clone()),
            Message::UpdateProcessingTime(Time::from_secs(1)),
            Message::FlushKey(key.clone()),
            Message::Finish(None),
        ] {
            assert!(!matches!(m, Message::Process(_)));
            m.dispatch(parent, &mut sink).unwrap();
        }
        assert_eq!(sink.retractions(), vec![key.clone()]);
        assert_eq!(sink.processing_times(), vec![Time::from_secs(1)]);
        assert_eq!(sink.flushed_keys(), vec![key]);
        assert!(sink.is_finished());
    }

    #[test]
    fn narrow_ignores_progress_after_finish() {
        let (mut t, a, _b) = narrow();
        let parent = DatasetId::new_random();
        t.finish(parent, None);
        t.update_watermark(parent, Time::from_secs(5)).unwrap();
        t.update_processing_time(parent, Time::from_secs(6)).unwrap();
        t.retract_table(parent, GroupKey::empty()).unwrap();
        t.flush_key(parent, GroupKey::empty()).unwrap();

        assert!(a.watermarks().is_empty());
        assert!(a.processing_times().is_empty());
        assert!(a.retractions().is_empty());
        assert!(a.flushed_keys().is_empty());
        assert_eq!(a.finish_count(), 1);
    }

    #[test]
    fn only_finish_is_terminal() {
        let key = GroupKey::empty();
        assert!(Message::Finish(None).is_finish());
        assert!(Message::Finish(Some(Error::Canceled)).is_finish());
        assert!(!Message::FlushKey(key.clone()).is_finish());
        assert!(!Message::RetractTable(key).is_finish());
        assert!(!Message::UpdateWatermark(Time::EPOCH).is_finish());
        assert!(!Message::Process(ints(&[1])).is_finish());
        assert_eq!(Message::FlushKey(GroupKey::empty()).kind(), "flush_key");
    }
}
