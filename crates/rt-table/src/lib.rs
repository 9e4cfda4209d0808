#![forbid(unsafe_code)]

use std::fmt;
use std::slice;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Null,
    Bool,
    Int64,
    Float64,
    Utf8,
    Row,
    Table,
}

/// A field value: a scalar, a nested row, or a nested table.
///
/// Equality is value equality with one amendment: `Float64(NaN)` compares
/// equal to itself, so rows and tables containing NaN are reflexively equal.
/// Ints and floats never compare equal here; numeric unification applies
/// only to join keys (see [`Value::join_key`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    Utf8(String),
    Row(Row),
    Table(Table),
}

impl Value {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Int64(_) => ValueKind::Int64,
            Self::Float64(_) => ValueKind::Float64,
            Self::Utf8(_) => ValueKind::Utf8,
            Self::Row(_) => ValueKind::Row,
            Self::Table(_) => ValueKind::Table,
        }
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float64(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Utf8(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_row(&self) -> Option<&Row> {
        match self {
            Self::Row(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Self::Table(v) => Some(v),
            _ => None,
        }
    }

    pub fn to_f64(&self) -> Result<f64, ValueError> {
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int64(v) => Ok(*v as f64),
            Self::Float64(v) => Ok(*v),
            Self::Null => Err(ValueError::Null),
            other => Err(ValueError::KindMismatch {
                expected: ValueKind::Float64,
                found: other.kind(),
            }),
        }
    }

    pub fn to_i64(&self) -> Result<i64, ValueError> {
        match self {
            Self::Bool(v) => Ok(i64::from(*v)),
            Self::Int64(v) => Ok(*v),
            Self::Float64(v) => match integral_f64(*v) {
                Some(i) => Ok(i),
                None => Err(ValueError::LossyFloatToInt { value: *v }),
            },
            Self::Null => Err(ValueError::Null),
            other => Err(ValueError::KindMismatch {
                expected: ValueKind::Int64,
                found: other.kind(),
            }),
        }
    }

    /// Derive the hashable join-key representation of this value, or `None`
    /// when the value cannot key a bucket (null, NaN, nested row/table).
    ///
    /// Equal numeric values hash identically: integral floats key as `Int64`,
    /// so `Float64(1.0)` and `Int64(1)` land in the same bucket, and `-0.0`
    /// normalizes to `Int64(0)`.
    #[must_use]
    pub fn join_key(&self) -> Option<JoinKey> {
        match self {
            Self::Bool(v) => Some(JoinKey::Bool(*v)),
            Self::Int64(v) => Some(JoinKey::Int64(*v)),
            Self::Float64(v) => float_join_key(*v),
            Self::Utf8(v) => Some(JoinKey::Utf8(v.clone())),
            Self::Null | Self::Row(_) | Self::Table(_) => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int64(a), Self::Int64(b)) => a == b,
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || a == b,
            (Self::Utf8(a), Self::Utf8(b)) => a == b,
            (Self::Row(a), Self::Row(b)) => a == b,
            (Self::Table(a), Self::Table(b)) => a == b,
            _ => false,
        }
    }
}

fn integral_f64(v: f64) -> Option<i64> {
    if !v.is_finite() || v.trunc() != v {
        return None;
    }
    let i = v as i64;
    // Round-trip check rejects magnitudes that saturate the cast.
    if i as f64 == v { Some(i) } else { None }
}

fn float_join_key(v: f64) -> Option<JoinKey> {
    if v.is_nan() {
        return None;
    }
    match integral_f64(v) {
        Some(i) => Some(JoinKey::Int64(i)),
        None => Some(JoinKey::Float64(v.to_bits())),
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Utf8(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Utf8(value)
    }
}

impl From<Row> for Value {
    fn from(value: Row) -> Self {
        Self::Row(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Self::Table(value)
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("expected {expected:?} value but found {found:?}")]
    KindMismatch {
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("value is null")]
    Null,
    #[error("cannot convert float {value} to int64 without loss")]
    LossyFloatToInt { value: f64 },
}

/// Hashable representation of a join-key value.
///
/// Built via [`Value::join_key`], which guarantees that values equal under
/// table equality semantics map to the same variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum JoinKey {
    Bool(bool),
    Int64(i64),
    /// Non-integral finite float, keyed by its IEEE-754 bit pattern.
    Float64(u64),
    Utf8(String),
}

// ── Row ────────────────────────────────────────────────────────────────

/// One record: an insertion-ordered mapping from field name to [`Value`].
///
/// Field names are unique within a row. `insert` replaces an existing field
/// in place and appends a new one at the end, so merging two rows preserves
/// the left row's field order and appends the right row's new fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Value)>,
}

impl Row {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        let mut row = Self::new();
        for (key, value) in pairs {
            row.insert(key, value);
        }
        row
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find_map(|(k, v)| (k == key).then_some(v))
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries
            .iter_mut()
            .find_map(|(k, v)| (k.as_str() == key).then_some(v))
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert a field, returning the previous value when the field existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Remove a field, returning its value when it existed. Remaining fields
    /// keep their relative order.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let position = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(position).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter().map(|(_, v)| v)
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}

impl<K, V> Extend<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Value>,
{
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RowVisitor;

        impl<'de> Visitor<'de> for RowVisitor {
            type Value = Row;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a map of field names to values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Row, A::Error> {
                let mut row = Row::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    row.insert(key, value);
                }
                Ok(row)
            }
        }

        deserializer.deserialize_map(RowVisitor)
    }
}

// ── Table ──────────────────────────────────────────────────────────────

/// An ordered sequence of rows. No uniqueness constraint on any field; rows
/// may have differing shapes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Row> {
        self.rows.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Row> {
        self.rows.get_mut(index)
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub fn iter(&self) -> slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn iter_mut(&mut self) -> slice::IterMut<'_, Row> {
        self.rows.iter_mut()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    #[must_use]
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Collect the value at `key` from every row that has the field, in row
    /// order. Rows lacking the field contribute nothing, so the result may be
    /// shorter than the table.
    #[must_use]
    pub fn extract_column(&self, key: &str) -> Vec<Value> {
        self.rows
            .iter()
            .filter_map(|row| row.get(key).cloned())
            .collect()
    }

    /// Delete `key` from every row in place. Rows without the field are left
    /// unchanged. Idempotent.
    pub fn remove_column(&mut self, key: &str) {
        for row in &mut self.rows {
            row.remove(key);
        }
    }
}

impl From<Vec<Row>> for Table {
    fn from(rows: Vec<Row>) -> Self {
        Self::from_rows(rows)
    }
}

impl FromIterator<Row> for Table {
    fn from_iter<T: IntoIterator<Item = Row>>(iter: T) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl Extend<Row> for Table {
    fn extend<T: IntoIterator<Item = Row>>(&mut self, iter: T) {
        self.rows.extend(iter);
    }
}

impl IntoIterator for Table {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Table {
    type Item = &'a Row;
    type IntoIter = slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl<'a> IntoIterator for &'a mut Table {
    type Item = &'a mut Row;
    type IntoIter = slice::IterMut<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::{JoinKey, Row, Table, Value, ValueError, ValueKind};

    fn sample_table() -> Table {
        Table::from_rows(vec![
            Row::from_pairs([("id", Value::Int64(1)), ("name", Value::from("ada"))]),
            Row::from_pairs([("id", Value::Int64(2))]),
            Row::from_pairs([("name", Value::from("grace"))]),
        ])
    }

    #[test]
    fn insert_replaces_in_place_and_appends_new_fields() {
        let mut row = Row::from_pairs([("a", Value::Int64(1)), ("b", Value::Int64(2))]);
        let previous = row.insert("a", Value::Int64(10));
        assert_eq!(previous, Some(Value::Int64(1)));
        row.insert("c", Value::Int64(3));

        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        assert_eq!(row.get("a"), Some(&Value::Int64(10)));
    }

    #[test]
    fn remove_preserves_remaining_order() {
        let mut row = Row::from_pairs([
            ("a", Value::Int64(1)),
            ("b", Value::Int64(2)),
            ("c", Value::Int64(3)),
        ]);
        assert_eq!(row.remove("b"), Some(Value::Int64(2)));
        assert_eq!(row.remove("b"), None);

        let keys: Vec<&str> = row.keys().collect();
        assert_eq!(keys, vec!["a", "c"]);
    }

    #[test]
    fn extract_column_skips_rows_without_the_field() {
        let table = sample_table();
        let ids = table.extract_column("id");
        assert_eq!(ids, vec![Value::Int64(1), Value::Int64(2)]);
    }

    #[test]
    fn extract_column_is_a_presence_test_not_a_null_test() {
        let table = Table::from_rows(vec![
            Row::from_pairs([("id", Value::Null)]),
            Row::from_pairs([("id", Value::Int64(2))]),
        ]);
        assert_eq!(
            table.extract_column("id"),
            vec![Value::Null, Value::Int64(2)]
        );
    }

    #[test]
    fn remove_column_handles_heterogeneous_rows_and_is_idempotent() {
        let mut table = sample_table();
        table.remove_column("id");
        let once = table.clone();
        table.remove_column("id");
        assert_eq!(table, once);
        assert!(table.iter().all(|row| !row.contains_key("id")));
        assert_eq!(table.get(2).and_then(|row| row.get("name")), Some(&Value::from("grace")));
    }

    #[test]
    fn join_key_unifies_integral_floats_with_ints() {
        assert_eq!(Value::Float64(1.0).join_key(), Some(JoinKey::Int64(1)));
        assert_eq!(Value::Int64(1).join_key(), Some(JoinKey::Int64(1)));
        assert_eq!(Value::Float64(-0.0).join_key(), Some(JoinKey::Int64(0)));
        assert_eq!(Value::Float64(0.0).join_key(), Some(JoinKey::Int64(0)));
    }

    #[test]
    fn join_key_keys_fractional_floats_by_bits() {
        assert_eq!(
            Value::Float64(1.5).join_key(),
            Some(JoinKey::Float64(1.5_f64.to_bits()))
        );
    }

    #[test]
    fn non_keyable_values_have_no_join_key() {
        assert_eq!(Value::Null.join_key(), None);
        assert_eq!(Value::Float64(f64::NAN).join_key(), None);
        assert_eq!(Value::Row(Row::new()).join_key(), None);
        assert_eq!(Value::Table(Table::new()).join_key(), None);
    }

    #[test]
    fn huge_floats_do_not_collide_with_saturated_ints() {
        let huge = 2.0_f64.powi(63);
        assert_eq!(
            Value::Float64(huge).join_key(),
            Some(JoinKey::Float64(huge.to_bits()))
        );
    }

    #[test]
    fn nan_values_compare_equal_to_themselves() {
        let row = Row::from_pairs([("x", Value::Float64(f64::NAN))]);
        assert_eq!(row.clone(), row);
        assert_ne!(Value::Int64(1), Value::Float64(1.0));
        assert_ne!(Value::Float64(f64::NAN), Value::Float64(1.0));
    }

    #[test]
    fn to_i64_rejects_fractional_floats() {
        assert_eq!(Value::Float64(4.0).to_i64(), Ok(4));
        assert_eq!(
            Value::Float64(4.5).to_i64(),
            Err(ValueError::LossyFloatToInt { value: 4.5 })
        );
    }

    #[test]
    fn to_f64_reports_kind_mismatch_for_strings() {
        let err = Value::from("x").to_f64().expect_err("must fail");
        assert_eq!(
            err,
            ValueError::KindMismatch {
                expected: ValueKind::Float64,
                found: ValueKind::Utf8,
            }
        );
        assert_eq!(Value::Bool(true).to_f64(), Ok(1.0));
    }

    #[test]
    fn row_serializes_as_an_ordered_map() {
        let row = Row::from_pairs([("b", Value::Int64(2)), ("a", Value::Int64(1))]);
        let json = serde_json::to_string(&row).expect("serialize");
        assert_eq!(
            json,
            r#"{"b":{"kind":"int64","value":2},"a":{"kind":"int64","value":1}}"#
        );

        let back: Row = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, row);
    }

    #[test]
    fn table_serde_round_trips_nested_values() {
        let table = Table::from_rows(vec![Row::from_pairs([
            ("id", Value::Int64(7)),
            (
                "detail",
                Value::Row(Row::from_pairs([("score", Value::Float64(0.5))])),
            ),
        ])]);
        let json = serde_json::to_string(&table).expect("serialize");
        let back: Table = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, table);
    }
}
