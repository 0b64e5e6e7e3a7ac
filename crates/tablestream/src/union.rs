//! Merges the tables of several parents into one stream.

use std::collections::{HashMap, HashSet};

use log::{debug, warn};

use crate::builder::{add_new_table_cols, append_mapped_cols_with_nulls};
use crate::dataset::{Dataset, DatasetId};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::Table;
use crate::time::Time;
use crate::transformation::Transformation;

/// Concatenates every parent's tables per group key.
///
/// Output columns appear in first-seen order across all inputs; rows from a table that lacks a
/// column get nulls there. The watermark forwarded downstream is the minimum over the parents
/// still running, once each of them has reported one.
pub struct UnionTransformation {
    d: Dataset,
    remaining: HashSet<DatasetId>,
    watermarks: HashMap<DatasetId, Time>,
    forwarded_watermark: Option<Time>,
    finished: bool,
}

impl UnionTransformation {
    pub fn new(d: Dataset, parents: &[DatasetId]) -> Self {
        Self {
            d,
            remaining: parents.iter().copied().collect(),
            watermarks: HashMap::new(),
            forwarded_watermark: None,
            finished: false,
        }
    }

    pub fn dataset(&self) -> &Dataset {
        &self.d
    }

    fn ignore(&self, what: &str, parent: DatasetId) -> bool {
        if self.finished {
            warn!("union {} ignoring {what} from {parent} after finish", self.d.id());
        }
        self.finished
    }

    fn forward_watermark(&mut self) -> Result<()> {
        let mut low: Option<Time> = None;
        for parent in &self.remaining {
            match self.watermarks.get(parent) {
                Some(&t) => low = Some(low.map_or(t, |l| l.min(t))),
                None => return Ok(()),
            }
        }
        let Some(low) = low else {
            return Ok(());
        };
        if self.forwarded_watermark.is_some_and(|f| f >= low) {
            return Ok(());
        }
        self.forwarded_watermark = Some(low);
        self.d.update_watermark(low)
    }
}

impl Transformation for UnionTransformation {
    fn process(&mut self, parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        if self.ignore("table", parent) {
            return Ok(());
        }
        let key = table.key().clone();
        let builder = self.d.cache_mut().table_builder(&key).into_builder();
        let col_map = add_new_table_cols(table.cols(), builder)?;
        table.do_chunks(&mut |cr| append_mapped_cols_with_nulls(cr, builder, &col_map))
    }

    fn retract_table(&mut self, parent: DatasetId, key: GroupKey) -> Result<()> {
        if self.ignore("retraction", parent) {
            return Ok(());
        }
        self.d.retract_table(&key)
    }

    fn update_watermark(&mut self, parent: DatasetId, t: Time) -> Result<()> {
        if self.ignore("watermark", parent) {
            return Ok(());
        }
        let entry = self.watermarks.entry(parent).or_insert(t);
        *entry = (*entry).max(t);
        self.forward_watermark()
    }

    fn update_processing_time(&mut self, parent: DatasetId, t: Time) -> Result<()> {
        if self.ignore("processing time", parent) {
            return Ok(());
        }
        self.d.update_processing_time(t)
    }

    fn finish(&mut self, parent: DatasetId, err: Option<Error>) {
        if self.ignore("finish", parent) {
            return;
        }
        if let Some(err) = err {
            debug!("union {} short-circuits on error from {parent}: {err}", self.d.id());
            self.finished = true;
            self.d.finish(Some(err));
            return;
        }
        self.remaining.remove(&parent);
        self.watermarks.remove(&parent);
        if self.remaining.is_empty() {
            self.finished = true;
            self.d.finish(None);
        } else if let Err(err) = self.forward_watermark() {
            self.finished = true;
            self.d.finish(Some(err));
        }
    }
}
