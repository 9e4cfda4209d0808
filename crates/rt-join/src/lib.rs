#![forbid(unsafe_code)]

//! Hash-grouped joins over [`Table`] values.
//!
//! All three operations share the same shape: build a grouping index over the
//! right table keyed by the join-key value, then scan the left table in order,
//! fanning out one merged row per bucket entry. The index borrows right rows
//! and lives only for the duration of one call.

use std::collections::HashMap;

use rt_table::{JoinKey, Row, Table, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinType {
    Inner,
    Left,
}

/// Left join: every left row appears in the output. A left row with N
/// matching right rows produces N merged rows (right fields overlaid, right
/// values winning on collision); an unmatched left row passes through
/// unchanged.
///
/// `right_key` defaults to `left_key` when `None`. An empty right table
/// returns a clone of `left`.
#[must_use]
pub fn left_join(left: &Table, right: &Table, left_key: &str, right_key: Option<&str>) -> Table {
    if right.is_empty() {
        return left.clone();
    }
    hash_join(
        left,
        right,
        left_key,
        right_key.unwrap_or(left_key),
        JoinType::Left,
        None,
    )
}

/// Inner join: like [`left_join`], except unmatched left rows emit nothing.
/// An empty right table returns an empty table.
#[must_use]
pub fn inner_join(left: &Table, right: &Table, left_key: &str, right_key: Option<&str>) -> Table {
    if right.is_empty() {
        return Table::new();
    }
    hash_join(
        left,
        right,
        left_key,
        right_key.unwrap_or(left_key),
        JoinType::Inner,
        None,
    )
}

/// Left join with a per-field overlay filter.
///
/// `filter` receives each (field name, value) of a matched right row and
/// decides whether that field is applied to the merged row; a rejected field
/// leaves the left row's value (if any) untouched. Unmatched left rows pass
/// through unchanged. An empty right table returns a clone of `left` without
/// invoking the filter.
#[must_use]
pub fn filtered_left_join<F>(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: Option<&str>,
    mut filter: F,
) -> Table
where
    F: FnMut(&str, &Value) -> bool,
{
    if right.is_empty() {
        return left.clone();
    }
    hash_join(
        left,
        right,
        left_key,
        right_key.unwrap_or(left_key),
        JoinType::Left,
        Some(&mut filter),
    )
}

/// Group right rows by their join-key value, preserving right-table order
/// within each bucket. Rows whose key field is missing or not keyable (null,
/// NaN, nested row/table) are excluded; they can never be matched.
fn build_right_index<'a>(right: &'a Table, right_key: &str) -> HashMap<JoinKey, Vec<&'a Row>> {
    let mut index: HashMap<JoinKey, Vec<&Row>> = HashMap::new();
    for row in right {
        if let Some(key) = row.get(right_key).and_then(Value::join_key) {
            index.entry(key).or_default().push(row);
        }
    }
    index
}

fn estimate_output_rows(
    left: &Table,
    index: &HashMap<JoinKey, Vec<&Row>>,
    left_key: &str,
    join_type: JoinType,
) -> usize {
    left.iter()
        .map(|row| {
            let bucket = row
                .get(left_key)
                .and_then(Value::join_key)
                .and_then(|key| index.get(&key));
            match bucket {
                Some(matches) => matches.len(),
                None if matches!(join_type, JoinType::Left) => 1,
                None => 0,
            }
        })
        .sum()
}

fn hash_join(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
    join_type: JoinType,
    mut filter: Option<&mut dyn FnMut(&str, &Value) -> bool>,
) -> Table {
    let index = build_right_index(right, right_key);
    let mut out = Vec::with_capacity(estimate_output_rows(left, &index, left_key, join_type));

    for row in left {
        let bucket = row
            .get(left_key)
            .and_then(Value::join_key)
            .and_then(|key| index.get(&key));
        match bucket {
            Some(matches) => {
                for matched in matches {
                    let reborrow = filter.as_mut().map(|f| &mut **f as &mut dyn FnMut(&str, &Value) -> bool);
                    out.push(merge_rows(row, matched, reborrow));
                }
            }
            None if matches!(join_type, JoinType::Left) => out.push(row.clone()),
            None => {}
        }
    }

    Table::from_rows(out)
}

/// Clone the left row and overlay the right row's fields through
/// `Row::insert`, so shared fields keep their left position with the right
/// value and new right fields append in right order.
fn merge_rows(
    left: &Row,
    right: &Row,
    mut filter: Option<&mut dyn FnMut(&str, &Value) -> bool>,
) -> Row {
    let mut merged = left.clone();
    for (field, value) in right.iter() {
        let keep = match filter.as_deref_mut() {
            Some(filter) => filter(field, value),
            None => true,
        };
        if keep {
            merged.insert(field.to_owned(), value.clone());
        }
    }
    merged
}
