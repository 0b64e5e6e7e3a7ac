//! Assigns rows to fixed time windows.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::builder::{add_table_cols, TableBuilder};
use crate::dataset::{Dataset, DatasetId};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::{
    col_idx, Table, DEFAULT_START_COL_LABEL, DEFAULT_STOP_COL_LABEL, DEFAULT_TIME_COL_LABEL,
};
use crate::time::{Duration, Time};
use crate::transformation::Transformation;
use crate::types::{ColMeta, ColType, Value};
use crate::window::{Bounds, Window};

/// Serializable description of a fixed window operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSpec {
    pub every: Duration,
    /// Defaults to `every`.
    pub period: Option<Duration>,
    pub offset: Duration,
    pub time_column: String,
    pub start_column: String,
    pub stop_column: String,
    /// Emit a table for every window in the global bounds, including windows without rows.
    pub create_empty: bool,
}

impl Default for WindowSpec {
    fn default() -> Self {
        Self {
            every: Duration::INFINITE,
            period: None,
            offset: Duration::ZERO,
            time_column: DEFAULT_TIME_COL_LABEL.to_string(),
            start_column: DEFAULT_START_COL_LABEL.to_string(),
            stop_column: DEFAULT_STOP_COL_LABEL.to_string(),
            create_empty: false,
        }
    }
}

impl WindowSpec {
    pub fn new(every: Duration) -> Self {
        Self {
            every,
            ..Self::default()
        }
    }

    pub fn window(&self) -> Result<Window> {
        Window::new(self.every, self.period.unwrap_or(self.every), self.offset)
    }
}

/// Output schema for one input schema.
struct WindowSchema {
    cols: Vec<ColMeta>,
    time_idx: usize,
    start_idx: usize,
    stop_idx: usize,
}

/// Copies every row into the partition of each window containing its timestamp.
///
/// The output key is the input key plus the window's start and stop columns; the output schema is
/// the input schema plus those columns when they are missing.
pub struct FixedWindowTransformation {
    d: Dataset,
    window: Window,
    bounds: Bounds,
    time_col: String,
    start_col: String,
    stop_col: String,
    create_empty: bool,
}

impl FixedWindowTransformation {
    /// `bounds` is the global time range of the query; windows are clipped to it.
    pub fn new(spec: &WindowSpec, bounds: Option<Bounds>, d: Dataset) -> Result<Self> {
        let bounds = bounds.ok_or(Error::NilBounds)?;
        Ok(Self {
            d,
            window: spec.window()?,
            bounds,
            time_col: spec.time_column.clone(),
            start_col: spec.start_column.clone(),
            stop_col: spec.stop_column.clone(),
            create_empty: spec.create_empty,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn dataset(&self) -> &Dataset {
        &self.d
    }

    fn schema(&self, cols: &[ColMeta]) -> Result<WindowSchema> {
        let time_idx = col_idx(&self.time_col, cols).ok_or_else(|| Error::MissingTimeColumn {
            label: self.time_col.clone(),
        })?;
        expect_time(&cols[time_idx])?;

        let mut cols = cols.to_vec();
        let mut bound_col = |label: &str| -> Result<usize> {
            match col_idx(label, &cols) {
                Some(j) => {
                    expect_time(&cols[j])?;
                    Ok(j)
                }
                None => {
                    cols.push(ColMeta::new(label, ColType::Time));
                    Ok(cols.len() - 1)
                }
            }
        };
        let start_idx = bound_col(self.start_col.as_str())?;
        let stop_idx = bound_col(self.stop_col.as_str())?;
        Ok(WindowSchema {
            cols,
            time_idx,
            start_idx,
            stop_idx,
        })
    }

    /// The key of window `b` for input key `key`.
    fn window_key(&self, key: &GroupKey, b: Bounds) -> GroupKey {
        let mut cols = key.cols().to_vec();
        let mut values = key.values().to_vec();
        for (label, t) in [(&self.start_col, b.start), (&self.stop_col, b.stop)] {
            match key.col_idx(label) {
                Some(j) => {
                    cols[j] = ColMeta::new(label.as_str(), ColType::Time);
                    values[j] = Value::Time(t);
                }
                None => {
                    cols.push(ColMeta::new(label.as_str(), ColType::Time));
                    values.push(Value::Time(t));
                }
            }
        }
        GroupKey::new(cols, values)
    }

    /// The builder for window `b`, declaring the schema on first use.
    fn builder<'a>(
        d: &'a mut Dataset,
        key: GroupKey,
        schema: &WindowSchema,
    ) -> Result<&'a mut TableBuilder> {
        let entry = d.cache_mut().table_builder(&key);
        let created = entry.is_created();
        let b = entry.into_builder();
        if created {
            add_table_cols(&schema.cols, b)?;
        }
        Ok(b)
    }

    /// The windows a row at `t` belongs to, clipped to the global bounds. Windows that clip to
    /// the same interval are reported once.
    fn windows_for(&self, t: Time) -> Vec<Bounds> {
        let mut windows: Vec<Bounds> = self
            .window
            .get_overlapping_bounds(t, t.add_nanos(1))
            .into_iter()
            .map(|b| b.intersect(&self.bounds))
            .filter(|b| b.contains(t))
            .collect();
        windows.dedup();
        windows
    }
}

fn expect_time(meta: &ColMeta) -> Result<()> {
    if meta.col_type != ColType::Time {
        return Err(Error::ColumnTypeMismatch {
            label: meta.label.clone(),
            expected: ColType::Time,
            actual: meta.col_type,
        });
    }
    Ok(())
}

impl Transformation for FixedWindowTransformation {
    fn process(&mut self, _parent: DatasetId, table: Box<dyn Table>) -> Result<()> {
        if self.d.is_finished() {
            warn!("window {} ignoring {} after finish", self.d.id(), table.key());
            return Ok(());
        }
        let schema = self.schema(table.cols())?;
        if self.bounds.is_empty() {
            debug!("window bounds {} are empty, dropping {}", self.bounds, table.key());
            return Ok(());
        }
        let key = table.key().clone();

        if self.create_empty {
            for b in self.window.clipped_bounds(&self.bounds) {
                let wkey = self.window_key(&key, b);
                Self::builder(&mut self.d, wkey, &schema)?;
            }
        }

        let n_input = table.cols().len();
        table.do_chunks(&mut |cr| {
            let times = cr.times(schema.time_idx)?;
            for i in 0..cr.len() {
                let Some(&t) = times.get(i) else {
                    continue;
                };
                for b in self.windows_for(t) {
                    let wkey = self.window_key(&key, b);
                    let builder = Self::builder(&mut self.d, wkey, &schema)?;
                    for j in 0..schema.cols.len() {
                        let v = if j == schema.start_idx {
                            Value::Time(b.start)
                        } else if j == schema.stop_idx {
                            Value::Time(b.stop)
                        } else if j < n_input {
                            cr.value(j, i)?
                        } else {
                            Value::Null
                        };
                        builder.append_value(j, &v)?;
                    }
                }
            }
            Ok(())
        })
    }

    fn retract_table(&mut self, _parent: DatasetId, _key: GroupKey) -> Result<()> {
        Err(Error::Unimplemented("window retraction".to_string()))
    }

    fn update_watermark(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.d.update_watermark(t)
    }

    fn update_processing_time(&mut self, _parent: DatasetId, t: Time) -> Result<()> {
        self.d.update_processing_time(t)
    }

    fn finish(&mut self, _parent: DatasetId, err: Option<Error>) {
        self.d.finish(err);
    }
}
