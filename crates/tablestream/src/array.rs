//! Typed, null-aware column storage.

use std::sync::Arc;

use crate::bitmap::Validity;
use crate::time::Time;
use crate::types::{ColType, Value};

/// A column of `T` with a validity mask. Null slots hold `T::default()`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Column<T> {
    values: Vec<T>,
    validity: Validity,
}

impl<T: Clone + Default> Column<T> {
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            validity: Validity::new(),
        }
    }

    pub fn from_options(values: impl IntoIterator<Item = Option<T>>) -> Self {
        let mut col = Self::new();
        for v in values {
            col.push_opt(v);
        }
        col
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_null(&self, i: usize) -> bool {
        !self.validity.is_valid(i)
    }

    pub fn is_valid(&self, i: usize) -> bool {
        self.validity.is_valid(i)
    }

    pub fn null_count(&self) -> usize {
        self.validity.null_count()
    }

    /// The raw slot at `i`. For a null row this is the default value.
    pub fn value(&self, i: usize) -> &T {
        &self.values[i]
    }

    pub fn get(&self, i: usize) -> Option<&T> {
        self.is_valid(i).then(|| &self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&T>> + '_ {
        self.values
            .iter()
            .zip(self.validity.iter())
            .map(|(v, valid)| valid.then_some(v))
    }

    pub fn push(&mut self, v: T) {
        self.values.push(v);
        self.validity.push(true);
    }

    pub fn push_null(&mut self) {
        self.values.push(T::default());
        self.validity.push(false);
    }

    pub fn push_opt(&mut self, v: Option<T>) {
        match v {
            Some(v) => self.push(v),
            None => self.push_null(),
        }
    }

    pub fn set(&mut self, i: usize, v: T) {
        self.values[i] = v;
        self.validity.set(i, true);
    }

    pub fn set_null(&mut self, i: usize) {
        self.values[i] = T::default();
        self.validity.set(i, false);
    }

    pub fn reserve(&mut self, additional: usize) {
        self.values.reserve(additional);
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.validity.clear();
    }

    pub fn extend_from(&mut self, other: &Column<T>) {
        self.values.extend_from_slice(&other.values);
        for valid in other.validity.iter() {
            self.validity.push(valid);
        }
    }

    pub fn take(&self, rows: &[usize]) -> Self {
        let mut out = Self::new();
        out.reserve(rows.len());
        for &i in rows {
            out.push_opt(self.get(i).cloned());
        }
        out
    }
}

/// Column storage for one of the supported [`ColType`]s.
#[derive(Clone, Debug, PartialEq)]
pub enum ColumnData {
    Bool(Column<bool>),
    Int(Column<i64>),
    UInt(Column<u64>),
    Float(Column<f64>),
    String(Column<Arc<str>>),
    Time(Column<Time>),
}

macro_rules! each_column {
    ($data:expr, $col:ident => $body:expr) => {
        match $data {
            ColumnData::Bool($col) => $body,
            ColumnData::Int($col) => $body,
            ColumnData::UInt($col) => $body,
            ColumnData::Float($col) => $body,
            ColumnData::String($col) => $body,
            ColumnData::Time($col) => $body,
        }
    };
}

impl ColumnData {
    pub fn new(col_type: ColType) -> Self {
        match col_type {
            ColType::Bool => ColumnData::Bool(Column::new()),
            ColType::Int => ColumnData::Int(Column::new()),
            ColType::UInt => ColumnData::UInt(Column::new()),
            ColType::Float => ColumnData::Float(Column::new()),
            ColType::String => ColumnData::String(Column::new()),
            ColType::Time => ColumnData::Time(Column::new()),
        }
    }

    /// `len` null rows of `col_type`.
    pub fn nulls(col_type: ColType, len: usize) -> Self {
        let mut data = Self::new(col_type);
        data.extend_nulls(len);
        data
    }

    pub fn col_type(&self) -> ColType {
        match self {
            ColumnData::Bool(_) => ColType::Bool,
            ColumnData::Int(_) => ColType::Int,
            ColumnData::UInt(_) => ColType::UInt,
            ColumnData::Float(_) => ColType::Float,
            ColumnData::String(_) => ColType::String,
            ColumnData::Time(_) => ColType::Time,
        }
    }

    pub fn len(&self) -> usize {
        each_column!(self, c => c.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, i: usize) -> bool {
        each_column!(self, c => c.is_null(i))
    }

    pub fn value(&self, i: usize) -> Value {
        match self {
            ColumnData::Bool(c) => c.get(i).copied().into(),
            ColumnData::Int(c) => c.get(i).copied().into(),
            ColumnData::UInt(c) => c.get(i).copied().into(),
            ColumnData::Float(c) => c.get(i).copied().into(),
            ColumnData::String(c) => c.get(i).map_or(Value::Null, |s| Value::String(s.clone())),
            ColumnData::Time(c) => c.get(i).copied().into(),
        }
    }

    pub fn push_null(&mut self) {
        each_column!(self, c => c.push_null())
    }

    pub fn extend_nulls(&mut self, n: usize) {
        each_column!(self, c => {
            c.reserve(n);
            for _ in 0..n {
                c.push_null();
            }
        })
    }

    /// Append `v`. Returns `false` (appending nothing) when `v` has a different type.
    pub fn push_value(&mut self, v: &Value) -> bool {
        match (self, v) {
            (data, Value::Null) => data.push_null(),
            (ColumnData::Bool(c), Value::Bool(v)) => c.push(*v),
            (ColumnData::Int(c), Value::Int(v)) => c.push(*v),
            (ColumnData::UInt(c), Value::UInt(v)) => c.push(*v),
            (ColumnData::Float(c), Value::Float(v)) => c.push(*v),
            (ColumnData::String(c), Value::String(v)) => c.push(v.clone()),
            (ColumnData::Time(c), Value::Time(v)) => c.push(*v),
            _ => return false,
        }
        true
    }

    /// Overwrite row `i`. Returns `false` (changing nothing) when `v` has a different type.
    pub fn set_value(&mut self, i: usize, v: &Value) -> bool {
        match (self, v) {
            (data, Value::Null) => data.set_null(i),
            (ColumnData::Bool(c), Value::Bool(v)) => c.set(i, *v),
            (ColumnData::Int(c), Value::Int(v)) => c.set(i, *v),
            (ColumnData::UInt(c), Value::UInt(v)) => c.set(i, *v),
            (ColumnData::Float(c), Value::Float(v)) => c.set(i, *v),
            (ColumnData::String(c), Value::String(v)) => c.set(i, v.clone()),
            (ColumnData::Time(c), Value::Time(v)) => c.set(i, *v),
            _ => return false,
        }
        true
    }

    pub fn set_null(&mut self, i: usize) {
        each_column!(self, c => c.set_null(i))
    }

    /// Append all rows of `other`. Returns `false` (appending nothing) on a type mismatch.
    pub fn extend_from(&mut self, other: &ColumnData) -> bool {
        match (self, other) {
            (ColumnData::Bool(a), ColumnData::Bool(b)) => a.extend_from(b),
            (ColumnData::Int(a), ColumnData::Int(b)) => a.extend_from(b),
            (ColumnData::UInt(a), ColumnData::UInt(b)) => a.extend_from(b),
            (ColumnData::Float(a), ColumnData::Float(b)) => a.extend_from(b),
            (ColumnData::String(a), ColumnData::String(b)) => a.extend_from(b),
            (ColumnData::Time(a), ColumnData::Time(b)) => a.extend_from(b),
            _ => return false,
        }
        true
    }

    /// A new column holding the given rows in the given order.
    pub fn take(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Bool(c) => ColumnData::Bool(c.take(rows)),
            ColumnData::Int(c) => ColumnData::Int(c.take(rows)),
            ColumnData::UInt(c) => ColumnData::UInt(c.take(rows)),
            ColumnData::Float(c) => ColumnData::Float(c.take(rows)),
            ColumnData::String(c) => ColumnData::String(c.take(rows)),
            ColumnData::Time(c) => ColumnData::Time(c.take(rows)),
        }
    }

    pub fn clear(&mut self) {
        each_column!(self, c => c.clear())
    }
}
