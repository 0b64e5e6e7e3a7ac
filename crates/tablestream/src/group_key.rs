//! Partition identity for tables.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::time::Time;
use crate::types::{ColMeta, ColType, Value};

/// The set of (label, type, value) triples shared by every row of a table.
///
/// Keys are cheap to clone. Equality, hashing and ordering look at columns in label order, so the
/// column order chosen at construction only affects [`GroupKey::cols`].
#[derive(Clone)]
pub struct GroupKey {
    inner: Arc<Inner>,
}

struct Inner {
    cols: Vec<ColMeta>,
    values: Vec<Value>,
    /// Column indexes in label order.
    sorted: Vec<usize>,
}

impl GroupKey {
    /// Build a key from parallel column and value lists.
    ///
    /// # Panics
    ///
    /// Panics when `cols` and `values` differ in length. Use [`GroupKey::try_new`] when the lists
    /// come from untrusted input.
    pub fn new(cols: Vec<ColMeta>, values: Vec<Value>) -> Self {
        match Self::try_new(cols, values) {
            Ok(key) => key,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_new(cols: Vec<ColMeta>, values: Vec<Value>) -> Result<Self> {
        if cols.len() != values.len() {
            return Err(Error::GroupKeyArity {
                cols: cols.len(),
                values: values.len(),
            });
        }
        let mut sorted: Vec<usize> = (0..cols.len()).collect();
        sorted.sort_by(|&a, &b| cols[a].label.cmp(&cols[b].label));
        Ok(Self {
            inner: Arc::new(Inner {
                cols,
                values,
                sorted,
            }),
        })
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    pub fn cols(&self) -> &[ColMeta] {
        &self.inner.cols
    }

    pub fn values(&self) -> &[Value] {
        &self.inner.values
    }

    pub fn len(&self) -> usize {
        self.inner.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.cols.is_empty()
    }

    pub fn col_idx(&self, label: &str) -> Option<usize> {
        let inner = &self.inner;
        inner
            .sorted
            .binary_search_by(|&i| inner.cols[i].label.as_str().cmp(label))
            .ok()
            .map(|pos| inner.sorted[pos])
    }

    pub fn has_col(&self, label: &str) -> bool {
        self.col_idx(label).is_some()
    }

    pub fn value(&self, idx: usize) -> &Value {
        &self.inner.values[idx]
    }

    pub fn is_null(&self, idx: usize) -> bool {
        self.inner.values[idx].is_null()
    }

    pub fn label_value(&self, label: &str) -> Option<&Value> {
        self.col_idx(label).map(|idx| self.value(idx))
    }

    fn typed<T>(&self, idx: usize, want: ColType, get: impl Fn(&Value) -> Option<T>) -> Result<Option<T>> {
        let meta = &self.inner.cols[idx];
        if meta.col_type != want {
            return Err(Error::ColumnTypeMismatch {
                label: meta.label.clone(),
                expected: want,
                actual: meta.col_type,
            });
        }
        Ok(get(self.value(idx)))
    }

    pub fn value_bool(&self, idx: usize) -> Result<Option<bool>> {
        self.typed(idx, ColType::Bool, Value::as_bool)
    }

    pub fn value_int(&self, idx: usize) -> Result<Option<i64>> {
        self.typed(idx, ColType::Int, Value::as_int)
    }

    pub fn value_uint(&self, idx: usize) -> Result<Option<u64>> {
        self.typed(idx, ColType::UInt, Value::as_uint)
    }

    pub fn value_float(&self, idx: usize) -> Result<Option<f64>> {
        self.typed(idx, ColType::Float, Value::as_float)
    }

    pub fn value_string(&self, idx: usize) -> Result<Option<Arc<str>>> {
        self.typed(idx, ColType::String, |v| match v {
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn value_time(&self, idx: usize) -> Result<Option<Time>> {
        self.typed(idx, ColType::Time, Value::as_time)
    }

    fn sorted_entries(&self) -> impl Iterator<Item = (&ColMeta, &Value)> + '_ {
        self.inner
            .sorted
            .iter()
            .map(move |&i| (&self.inner.cols[i], &self.inner.values[i]))
    }
}

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.inner, &other.inner) {
            return true;
        }
        self.len() == other.len()
            && self
                .sorted_entries()
                .zip(other.sorted_entries())
                .all(|((ca, va), (cb, vb))| ca == cb && va == vb)
    }
}

impl Eq for GroupKey {}

impl Hash for GroupKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.len().hash(state);
        for (meta, value) in self.sorted_entries() {
            meta.hash(state);
            value.hash(state);
        }
    }
}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Keys order column by column in label order. At the first differing label the key holding the
/// later label sorts first; then column types, then values (null first). When one key is a
/// prefix of the other, the shorter key sorts first.
impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for ((ca, va), (cb, vb)) in self.sorted_entries().zip(other.sorted_entries()) {
            let ord = cb
                .label
                .cmp(&ca.label)
                .then_with(|| ca.col_type.cmp(&cb.col_type))
                .then_with(|| va.cmp(vb));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        self.len().cmp(&other.len())
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (n, (meta, value)) in self.sorted_entries().enumerate() {
            if n > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", meta.label, value)?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GroupKey{self}")
    }
}

/// Incrementally assembles a [`GroupKey`].
#[derive(Clone, Debug, Default)]
pub struct GroupKeyBuilder {
    cols: Vec<ColMeta>,
    values: Vec<Value>,
}

impl GroupKeyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from the columns of an existing key.
    pub fn from_key(key: &GroupKey) -> Self {
        Self {
            cols: key.cols().to_vec(),
            values: key.values().to_vec(),
        }
    }

    pub fn add_key_value(&mut self, meta: ColMeta, value: Value) -> &mut Self {
        self.cols.push(meta);
        self.values.push(value);
        self
    }

    pub fn build(self) -> Result<GroupKey> {
        for (n, (meta, value)) in self.cols.iter().zip(&self.values).enumerate() {
            if self.cols[..n].iter().any(|c| c.label == meta.label) {
                return Err(Error::DuplicateColumn {
                    label: meta.label.clone(),
                });
            }
            if let Some(actual) = value.col_type() {
                if actual != meta.col_type {
                    return Err(Error::ColumnTypeMismatch {
                        label: meta.label.clone(),
                        expected: meta.col_type,
                        actual,
                    });
                }
            }
        }
        GroupKey::try_new(self.cols, self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn key(pairs: &[(&str, Value)]) -> GroupKey {
        let cols = pairs
            .iter()
            .map(|(label, v)| ColMeta::new(*label, v.col_type().unwrap_or(ColType::String)))
            .collect();
        GroupKey::new(cols, pairs.iter().map(|(_, v)| v.clone()).collect())
    }

    fn hash_of(k: &GroupKey) -> u64 {
        let mut h = DefaultHasher::new();
        k.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equality_ignores_construction_order() {
        let a = key(&[("host", "a".into()), ("region", "west".into())]);
        let b = key(&[("region", "west".into()), ("host", "a".into())]);
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
        assert_eq!(a.to_string(), "{host=a,region=west}");
    }

    #[test]
    fn single_value_change_breaks_equality() {
        let a = key(&[("host", "a".into()), ("n", Value::Int(1))]);
        let b = key(&[("host", "a".into()), ("n", Value::Int(2))]);
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn nulls_compare_equal_only_to_nulls() {
        let null = GroupKey::new(vec![ColMeta::new("t", ColType::Int)], vec![Value::Null]);
        let also_null = GroupKey::new(vec![ColMeta::new("t", ColType::Int)], vec![Value::Null]);
        let one = GroupKey::new(vec![ColMeta::new("t", ColType::Int)], vec![Value::Int(1)]);
        assert_eq!(null, also_null);
        assert_ne!(null, one);
        assert!(null < one);
    }

    #[test]
    fn later_label_sorts_first_and_prefix_sorts_first() {
        let a = key(&[("a", Value::Int(1))]);
        let b = key(&[("b", Value::Int(1))]);
        assert!(b < a);
        let ab = key(&[("a", Value::Int(1)), ("b", Value::Int(1))]);
        assert!(a < ab);
    }

    #[test]
    fn arity_mismatch_is_internal() {
        let err = GroupKey::try_new(vec![ColMeta::new("a", ColType::Int)], vec![]).unwrap_err();
        assert_eq!(err.code(), crate::Code::Internal);
    }

    #[test]
    fn typed_getters_check_the_declared_type() {
        let k = key(&[("_stop", Value::Time(Time::from_secs(60)))]);
        assert_eq!(k.value_time(0).unwrap(), Some(Time::from_secs(60)));
        assert_eq!(k.value_int(0).unwrap_err().code(), crate::Code::FailedPrecondition);
        assert_eq!(k.label_value("_stop"), Some(&Value::Time(Time::from_secs(60))));
        assert!(!k.has_col("_start"));
    }

    #[test]
    fn builder_rejects_duplicates_and_type_mismatches() {
        let base = key(&[("host", "a".into())]);
        let mut b = GroupKeyBuilder::from_key(&base);
        b.add_key_value(ColMeta::new("host", ColType::String), "b".into());
        assert!(matches!(b.build(), Err(Error::DuplicateColumn { .. })));

        let mut b = GroupKeyBuilder::new();
        b.add_key_value(ColMeta::new("n", ColType::Int), Value::Float(1.0));
        assert!(matches!(b.build(), Err(Error::ColumnTypeMismatch { .. })));
    }
}
