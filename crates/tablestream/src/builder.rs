//! Mutable per-partition output accumulation.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::array::ColumnData;
use crate::error::{Error, Result};
use crate::group_key::GroupKey;
use crate::table::{col_idx, BufferedTable, ColReader};
use crate::time::Time;
use crate::types::{ColMeta, ColType, Value};

/// Accumulates rows for one output table.
///
/// Columns are stored by ordinal and may temporarily differ in length while a row is being
/// appended column by column; [`TableBuilder::level_columns`] pads them back to a common length.
#[derive(Clone, Debug)]
pub struct TableBuilder {
    key: GroupKey,
    cols: Vec<ColMeta>,
    data: Vec<ColumnData>,
}

impl TableBuilder {
    pub fn new(key: GroupKey) -> Self {
        Self {
            key,
            cols: Vec::new(),
            data: Vec::new(),
        }
    }

    pub fn key(&self) -> &GroupKey {
        &self.key
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.cols
    }

    pub fn n_cols(&self) -> usize {
        self.cols.len()
    }

    /// The length of the longest column.
    pub fn n_rows(&self) -> usize {
        self.data.iter().map(ColumnData::len).max().unwrap_or(0)
    }

    pub fn col_idx(&self, label: &str) -> Option<usize> {
        col_idx(label, &self.cols)
    }

    /// Declare a column and return its ordinal. Rows already present read as null in the new
    /// column.
    pub fn add_col(&mut self, meta: ColMeta) -> Result<usize> {
        if self.col_idx(&meta.label).is_some() {
            return Err(Error::DuplicateColumn { label: meta.label });
        }
        let data = ColumnData::nulls(meta.col_type, self.n_rows());
        self.cols.push(meta);
        self.data.push(data);
        Ok(self.cols.len() - 1)
    }

    fn column_mut(&mut self, j: usize) -> Result<&mut ColumnData> {
        let len = self.data.len();
        self.data
            .get_mut(j)
            .ok_or(Error::ColumnOutOfRange { index: j, len })
    }

    fn mismatch(&self, j: usize, actual: ColType) -> Error {
        let meta = &self.cols[j];
        Error::ColumnTypeMismatch {
            label: meta.label.clone(),
            expected: meta.col_type,
            actual,
        }
    }

    pub fn append_value(&mut self, j: usize, v: &Value) -> Result<()> {
        if self.column_mut(j)?.push_value(v) {
            return Ok(());
        }
        let actual = v.col_type().unwrap_or(self.cols[j].col_type);
        Err(self.mismatch(j, actual))
    }

    pub fn append_bool(&mut self, j: usize, v: bool) -> Result<()> {
        self.append_value(j, &Value::Bool(v))
    }

    pub fn append_int(&mut self, j: usize, v: i64) -> Result<()> {
        self.append_value(j, &Value::Int(v))
    }

    pub fn append_uint(&mut self, j: usize, v: u64) -> Result<()> {
        self.append_value(j, &Value::UInt(v))
    }

    pub fn append_float(&mut self, j: usize, v: f64) -> Result<()> {
        self.append_value(j, &Value::Float(v))
    }

    pub fn append_string(&mut self, j: usize, v: &str) -> Result<()> {
        self.append_value(j, &Value::string(v))
    }

    pub fn append_time(&mut self, j: usize, v: Time) -> Result<()> {
        self.append_value(j, &Value::Time(v))
    }

    pub fn append_nil(&mut self, j: usize) -> Result<()> {
        self.column_mut(j)?.push_null();
        Ok(())
    }

    /// Append every row of `col` to column `j`.
    pub fn append_column(&mut self, j: usize, col: &ColumnData) -> Result<()> {
        if self.column_mut(j)?.extend_from(col) {
            return Ok(());
        }
        Err(self.mismatch(j, col.col_type()))
    }

    /// Append `n` nulls to column `j`.
    pub fn grow(&mut self, j: usize, n: usize) -> Result<()> {
        self.column_mut(j)?.extend_nulls(n);
        Ok(())
    }

    pub fn set_value(&mut self, i: usize, j: usize, v: &Value) -> Result<()> {
        let col = self.column_mut(j)?;
        if i >= col.len() {
            return Err(Error::RowOutOfRange { row: i, len: col.len() });
        }
        if col.set_value(i, v) {
            return Ok(());
        }
        let actual = v.col_type().unwrap_or(self.cols[j].col_type);
        Err(self.mismatch(j, actual))
    }

    pub fn set_nil(&mut self, i: usize, j: usize) -> Result<()> {
        self.set_value(i, j, &Value::Null)
    }

    /// Pad every column with nulls to the length of the longest one.
    pub fn level_columns(&mut self) {
        let n = self.n_rows();
        for col in &mut self.data {
            let missing = n - col.len();
            if missing > 0 {
                col.extend_nulls(missing);
            }
        }
    }

    /// Reorder rows by the named columns (nulls first, reversed when `desc`). The sort is stable.
    pub fn sort(&mut self, cols: &[&str], desc: bool) -> Result<()> {
        self.level_columns();
        let idxs = cols
            .iter()
            .map(|label| {
                self.col_idx(label).ok_or_else(|| Error::MissingColumn {
                    label: label.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut rows: Vec<usize> = (0..self.n_rows()).collect();
        rows.sort_by(|&a, &b| {
            let ord = idxs
                .iter()
                .map(|&j| self.data[j].value(a).cmp(&self.data[j].value(b)))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal);
            if desc {
                ord.reverse()
            } else {
                ord
            }
        });
        for col in &mut self.data {
            *col = col.take(&rows);
        }
        Ok(())
    }

    /// Drop all rows, keeping the schema.
    pub fn clear_data(&mut self) {
        for col in &mut self.data {
            col.clear();
        }
    }

    /// A snapshot of the rows accumulated so far as a single-chunk table.
    pub fn table(&self) -> Result<BufferedTable> {
        let cols: Arc<[ColMeta]> = self.cols.clone().into();
        let chunk = ColReader::try_new(self.key.clone(), cols.clone(), self.data.clone())?;
        let chunks = if chunk.is_empty() { Vec::new() } else { vec![chunk] };
        Ok(BufferedTable::new(self.key.clone(), cols, chunks))
    }
}

/// Declare every column in `cols`.
pub fn add_table_cols(cols: &[ColMeta], b: &mut TableBuilder) -> Result<()> {
    for meta in cols {
        b.add_col(meta.clone())?;
    }
    Ok(())
}

/// Declare a column for each key column.
pub fn add_table_key_cols(key: &GroupKey, b: &mut TableBuilder) -> Result<()> {
    add_table_cols(key.cols(), b)
}

/// Declare the columns of `cols` the builder does not have yet and return, for each input
/// column, the ordinal it maps to in the builder. A label already present with another type is a
/// schema collision.
pub fn add_new_table_cols(cols: &[ColMeta], b: &mut TableBuilder) -> Result<Vec<usize>> {
    let mut col_map = Vec::with_capacity(cols.len());
    for meta in cols {
        let j = match b.col_idx(&meta.label) {
            Some(j) => {
                let existing = b.cols()[j].col_type;
                if existing != meta.col_type {
                    return Err(Error::SchemaCollision {
                        label: meta.label.clone(),
                        existing,
                        incoming: meta.col_type,
                    });
                }
                j
            }
            None => b.add_col(meta.clone())?,
        };
        col_map.push(j);
    }
    Ok(col_map)
}

/// Append every column of `cr` to the builder column with the same ordinal.
pub fn append_cols(cr: &ColReader, b: &mut TableBuilder) -> Result<()> {
    for j in 0..cr.cols().len() {
        b.append_column(j, cr.column(j)?)?;
    }
    Ok(())
}

/// Append column `j` of `cr` to builder column `col_map[j]`.
pub fn append_mapped_cols(cr: &ColReader, b: &mut TableBuilder, col_map: &[usize]) -> Result<()> {
    for (j, &bj) in col_map.iter().enumerate() {
        b.append_column(bj, cr.column(j)?)?;
    }
    Ok(())
}

/// Like [`append_mapped_cols`], then pads builder columns `cr` does not cover with nulls.
pub fn append_mapped_cols_with_nulls(
    cr: &ColReader,
    b: &mut TableBuilder,
    col_map: &[usize],
) -> Result<()> {
    let target = b.n_rows() + cr.len();
    append_mapped_cols(cr, b, col_map)?;
    for j in 0..b.n_cols() {
        if !col_map.contains(&j) {
            let missing = target.saturating_sub(b.data[j].len());
            b.grow(j, missing)?;
        }
    }
    Ok(())
}

/// Append row `i` of `cr`, column by ordinal.
pub fn append_record(i: usize, cr: &ColReader, b: &mut TableBuilder) -> Result<()> {
    for j in 0..cr.cols().len() {
        b.append_value(j, &cr.value(j, i)?)?;
    }
    Ok(())
}

/// Append row `i` of `cr` through `col_map`, appending nulls to the builder columns it skips.
pub fn append_mapped_record_with_nulls(
    i: usize,
    cr: &ColReader,
    b: &mut TableBuilder,
    col_map: &[usize],
) -> Result<()> {
    let mut values = vec![Value::Null; b.n_cols()];
    for (j, &bj) in col_map.iter().enumerate() {
        values[bj] = cr.value(j, i)?;
    }
    for (bj, v) in values.iter().enumerate() {
        b.append_value(bj, v)?;
    }
    Ok(())
}

/// Append the key's value to each builder column named by a key column.
pub fn append_key_values(key: &GroupKey, b: &mut TableBuilder) -> Result<()> {
    append_key_values_n(key, b, 1)
}

/// Append the key's value `n` times to each builder column named by a key column.
pub fn append_key_values_n(key: &GroupKey, b: &mut TableBuilder, n: usize) -> Result<()> {
    for (meta, value) in key.cols().iter().zip(key.values()) {
        let j = b.col_idx(&meta.label).ok_or_else(|| Error::MissingKeyColumn {
            label: meta.label.clone(),
        })?;
        for _ in 0..n {
            b.append_value(j, value)?;
        }
    }
    Ok(())
}
