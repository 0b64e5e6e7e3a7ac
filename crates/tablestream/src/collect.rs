//! A terminal transformation that keeps everything it receives.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::dataset::DatasetId;
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::{BufferedTable, Table};
use crate::time::Time;
use crate::transformation::Transformation;

#[derive(Debug, Default)]
struct Collected {
    tables: Vec<BufferedTable>,
    retractions: Vec<GroupKey>,
    watermarks: Vec<Time>,
    processing_times: Vec<Time>,
    flushed_keys: Vec<GroupKey>,
    finishes: Vec<(DatasetId, Option<Error>)>,
}

/// Sink at the end of a chain. Clones share the same state, so one clone can be handed to the
/// chain while another inspects the results.
#[derive(Clone, Debug, Default)]
pub struct ResultCollector {
    state: Arc<Mutex<Collected>>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Collected> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn tables(&self) -> Vec<BufferedTable> {
        self.state().tables.clone()
    }

    /// Keys of the received tables, in arrival order.
    pub fn keys(&self) -> Vec<GroupKey> {
        self.state().tables.iter().map(|t| t.key().clone()).collect()
    }

    /// Received tables sorted by key.
    pub fn sorted_tables(&self) -> Vec<BufferedTable> {
        let mut tables = self.tables();
        tables.sort_by(|a, b| a.key().cmp(b.key()));
        tables
    }

    pub fn retractions(&self) -> Vec<GroupKey> {
        self.state().retractions.clone()
    }

    pub fn watermarks(&self) -> Vec<Time> {
        self.state().watermarks.clone()
    }

    pub fn processing_times(&self) -> Vec<Time> {
        self.state().processing_times.clone()
    }

    pub fn flushed_keys(&self) -> Vec<GroupKey> {
        self.state().flushed_keys.clone()
    }

    pub fn finish_count(&self) -> usize {
        self.state().finishes.len()
    }

    pub fn is_finished(&self) -> bool {
        self.finish_count() > 0
    }

    /// The first error any finish carried.
    pub fn error(&self) -> Option<Error> {
        self.state()
            .finishes
            .iter()
            .find_map(|(_, err)| err.clone())
    }
}

impl Transformation for ResultCollector {
    fn process(&mut self, _parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        let table = BufferedTable::from_table(table)?;
        self.state().tables.push(table);
        Ok(())
    }

    fn retract_table(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        self.state().retractions.push(key);
        Ok(())
    }

    fn update_watermark(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.state().watermarks.push(t);
        Ok(())
    }

    fn update_processing_time(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.state().processing_times.push(t);
        Ok(())
    }

    fn flush_key(&mut self, _parent: DatasetId, key: GroupKey) -> Result<()> {
        self.state().flushed_keys.push(key);
        Ok(())
    }

    fn finish(&mut self, parent: DatasetId, err: Option<Error>) {
        self.state().finishes.push((parent, err));
    }
}
