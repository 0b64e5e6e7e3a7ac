//! The columnar table contract consumed by every transformation.

use std::sync::Arc;

use crate::array::{Column, ColumnData};
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::time::Time;
use crate::types::{ColMeta, ColType, Value};

/// Conventional column labels.
pub const DEFAULT_START_COL_LABEL: &str = "_start";
pub const DEFAULT_STOP_COL_LABEL: &str = "_stop";
pub const DEFAULT_TIME_COL_LABEL: &str = "_time";
pub const DEFAULT_VALUE_COL_LABEL: &str = "_value";

/// A partition of rows sharing one [`GroupKey`].
///
/// A table is read exactly once: [`Table::do_chunks`] consumes it and its resources are released
/// when the call returns, whether iteration completed or was aborted by an error.
pub trait Table: Send {
    fn key(&self) -> &GroupKey;

    fn cols(&self) -> &[ColMeta];

    /// Whether the table is known to hold no rows.
    fn is_empty(&self) -> bool;

    /// Call `f` once per chunk, in order. The first error returned by `f` stops iteration and is
    /// returned unchanged.
    fn do_chunks(self: Box<Self>, f: &mut dyn FnMut(&ColReader) -> Result<()>) -> Result<()>;
}

/// One chunk of a table: a column-major batch of rows with the table's schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ColReader {
    key: GroupKey,
    cols: Arc<[ColMeta]>,
    data: Vec<ColumnData>,
    len: usize,
}

impl ColReader {
    /// Validates that there is one column per schema entry, that each column's data matches its
    /// declared type, and that all columns have the same length.
    pub fn try_new(key: GroupKey, cols: Arc<[ColMeta]>, data: Vec<ColumnData>) -> Result<Self> {
        if cols.len() != data.len() {
            return Err(Error::ColumnCountMismatch {
                expected: cols.len(),
                actual: data.len(),
            });
        }
        let len = data.first().map_or(0, ColumnData::len);
        for (meta, col) in cols.iter().zip(&data) {
            if col.col_type() != meta.col_type {
                return Err(Error::ColumnDataMismatch {
                    label: meta.label.clone(),
                    declared: meta.col_type,
                    actual: col.col_type(),
                });
            }
            if col.len() != len {
                return Err(Error::MismatchedColumnLengths {
                    label: meta.label.clone(),
                    expected: len,
                    actual: col.len(),
                });
            }
        }
        Ok(Self {
            key,
            cols,
            data,
            len,
        })
    }

    /// A zero-length chunk with the given schema.
    pub fn empty(key: GroupKey, cols: Arc<[ColMeta]>) -> Self {
        let data = cols.iter().map(|c| ColumnData::new(c.col_type)).collect();
        Self {
            key,
            cols,
            data,
            len: 0,
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub(crate) fn schema(&self) -> Arc<[ColMeta]> {
        self.cols.clone()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn column(&self, j: usize) -> Result<&ColumnData> {
        self.data.get(j).ok_or(Error::ColumnOutOfRange {
            index: j,
            len: self.data.len(),
        })
    }

    pub fn value(&self, j: usize, i: usize) -> Result<Value> {
        let col = self.column(j)?;
        if i >= self.len {
            return Err(Error::RowOutOfRange { row: i, len: self.len });
        }
        Ok(col.value(i))
    }

    fn mismatch(&self, j: usize, expected: ColType) -> Error {
        match self.cols.get(j) {
            Some(meta) => Error::ColumnTypeMismatch {
                label: meta.label.clone(),
                expected,
                actual: meta.col_type,
            },
            None => Error::ColumnOutOfRange {
                index: j,
                len: self.cols.len(),
            },
        }
    }

    pub fn bools(&self, j: usize) -> Result<&Column<bool>> {
        match self.data.get(j) {
            Some(ColumnData::Bool(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::Bool)),
        }
    }

    pub fn ints(&self, j: usize) -> Result<&Column<i64>> {
        match self.data.get(j) {
            Some(ColumnData::Int(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::Int)),
        }
    }

    pub fn uints(&self, j: usize) -> Result<&Column<u64>> {
        match self.data.get(j) {
            Some(ColumnData::UInt(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::UInt)),
        }
    }

    pub fn floats(&self, j: usize) -> Result<&Column<f64>> {
        match self.data.get(j) {
            Some(ColumnData::Float(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::Float)),
        }
    }

    pub fn strings(&self, j: usize) -> Result<&Column<Arc<str>>> {
        match self.data.get(j) {
            Some(ColumnData::String(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::String)),
        }
    }

    pub fn times(&self, j: usize) -> Result<&Column<Time>> {
        match self.data.get(j) {
            Some(ColumnData::Time(c)) => Ok(c),
            _ => Err(self.mismatch(j, ColType::Time)),
        }
    }
}

/// A table whose chunks are held in memory. Cloning copies the table so it can be handed to
/// several consumers.
#[derive(Clone, Debug, PartialEq)]
pub struct BufferedTable {
    key: GroupKey,
    cols: Arc<[ColMeta]>,
    chunks: Vec<ColReader>,
}

impl BufferedTable {
    pub fn new(key: GroupKey, cols: Arc<[ColMeta]>, chunks: Vec<ColReader>) -> Self {
        Self { key, cols, chunks }
    }

    /// Read `table` to completion and keep its chunks.
    pub fn from_table(table: Box<dyn Table>) -> Result<Self> {
        let key = table.key().clone();
        let cols: Arc<[ColMeta]> = table.cols().into();
        let mut chunks = Vec::new();
        table.do_chunks(&mut |cr| {
            if !cr.is_empty() {
                chunks.push(cr.clone());
            }
            Ok(())
        })?;
        Ok(Self { key, cols, chunks })
    }

    /// An in-memory table with no chunks yet.
    pub fn with_schema(key: GroupKey, cols: Arc<[ColMeta]>) -> Self {
        Self {
            key,
            cols,
            chunks: Vec::new(),
        }
    }

    /// Append one more chunk. Its schema must be the table's.
    pub fn push_chunk(&mut self, cr: ColReader) -> Result<()> {
        if cr.cols() != &*self.cols {
            return Err(Error::ChunkSchemaMismatch {
                key: self.key.to_string(),
            });
        }
        self.chunks.push(cr);
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.chunks.iter().map(ColReader::len).sum()
    }

    pub fn chunks(&self) -> &[ColReader] {
        &self.chunks
    }

    /// All rows, row-major.
    pub fn rows(&self) -> Vec<Vec<Value>> {
        let mut rows = Vec::with_capacity(self.n_rows());
        for cr in &self.chunks {
            for i in 0..cr.len() {
                rows.push((0..cr.cols().len()).map(|j| value_for_row(cr, i, j)).collect());
            }
        }
        rows
    }
}

impl Table for BufferedTable {
    fn key(&self) -> &GroupKey {
        &self.key
    }

    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn is_empty(&self) -> bool {
        self.chunks.iter().all(ColReader::is_empty)
    }

    fn do_chunks(self: Box<Self>, f: &mut dyn FnMut(&ColReader) -> Result<()>) -> Result<()> {
        for cr in &self.chunks {
            f(cr)?;
        }
        Ok(())
    }
}

/// A table with a schema and no rows. It presents one zero-length chunk.
#[derive(Clone, Debug)]
pub struct EmptyTable {
    key: GroupKey,
    cols: Arc<[ColMeta]>,
}

impl EmptyTable {
    pub fn new(key: GroupKey, cols: Vec<ColMeta>) -> Self {
        Self {
            key,
            cols: cols.into(),
        }
    }
}

impl Table for EmptyTable {
    fn key(&self) -> &GroupKey {
        &self.key
    }

    fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    fn is_empty(&self) -> bool {
        true
    }

    fn do_chunks(self: Box<Self>, f: &mut dyn FnMut(&ColReader) -> Result<()>) -> Result<()> {
        let this = *self;
        f(&ColReader::empty(this.key, this.cols))
    }
}

pub fn col_idx(label: &str, cols: &[ColMeta]) -> Option<usize> {
    cols.iter().position(|c| c.label == label)
}

pub fn has_col(label: &str, cols: &[ColMeta]) -> bool {
    col_idx(label, cols).is_some()
}

/// The value at row `i` of column `j`; `Null` when `j` or `i` is out of range.
pub fn value_for_row(cr: &ColReader, i: usize, j: usize) -> Value {
    cr.value(j, i).unwrap_or(Value::Null)
}

/// The group key formed by the columns of `cr` named in `on`, taking values from row `i`.
pub fn group_key_for_row_on(i: usize, cr: &ColReader, on: &[&str]) -> GroupKey {
    let mut cols = Vec::with_capacity(on.len());
    let mut values = Vec::with_capacity(on.len());
    for (j, meta) in cr.cols().iter().enumerate() {
        if on.contains(&meta.label.as_str()) {
            cols.push(meta.clone());
            values.push(value_for_row(cr, i, j));
        }
    }
    GroupKey::new(cols, values)
}

/// Read `table` into memory so it can be replayed.
pub fn copy_table(table: Box<dyn Table>) -> Result<BufferedTable> {
    BufferedTable::from_table(table)
}

/// Whether two tables have the same key, schema and rows, irrespective of chunking.
pub fn tables_equal(a: Box<dyn Table>, b: Box<dyn Table>) -> Result<bool> {
    let a = BufferedTable::from_table(a)?;
    let b = BufferedTable::from_table(b)?;
    Ok(a.key == b.key && a.cols == b.cols && a.rows() == b.rows())
}
