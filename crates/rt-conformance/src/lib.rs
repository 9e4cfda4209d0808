#![forbid(unsafe_code)]

//! Conformance layer for rowtable.
//!
//! Provides fixture builders and an independent nested-loop join oracle. The
//! oracle deliberately avoids the engine's grouping index: it re-derives the
//! join contract (key unification, missing-key asymmetry, fan-out, ordering,
//! empty-right short-circuits) from first principles so the property suites
//! can check the hash join against a second implementation.

use rt_table::{Row, Table, Value};

/// Build a row from `(field, int)` pairs. Fixture shorthand.
#[must_use]
pub fn int_row(pairs: &[(&str, i64)]) -> Row {
    pairs
        .iter()
        .map(|(field, value)| (*field, Value::Int64(*value)))
        .collect()
}

/// Build a table from slices of `(field, int)` pairs. Fixture shorthand.
#[must_use]
pub fn int_table(rows: &[&[(&str, i64)]]) -> Table {
    rows.iter().map(|pairs| int_row(pairs)).collect()
}

/// Nested-loop left join with the same contract as `rt_join::left_join`.
#[must_use]
pub fn oracle_left_join(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: Option<&str>,
) -> Table {
    oracle_join(left, right, left_key, right_key.unwrap_or(left_key), true)
}

/// Nested-loop inner join with the same contract as `rt_join::inner_join`.
#[must_use]
pub fn oracle_inner_join(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: Option<&str>,
) -> Table {
    oracle_join(left, right, left_key, right_key.unwrap_or(left_key), false)
}

/// Number of right rows a given left row matches. Zero when the left row has
/// no keyable join-key value.
#[must_use]
pub fn match_count(left_row: &Row, right: &Table, left_key: &str, right_key: &str) -> usize {
    let Some(key) = left_row.get(left_key).and_then(Value::join_key) else {
        return 0;
    };
    right
        .iter()
        .filter(|row| row.get(right_key).and_then(Value::join_key) == Some(key.clone()))
        .count()
}

fn oracle_join(
    left: &Table,
    right: &Table,
    left_key: &str,
    right_key: &str,
    keep_unmatched: bool,
) -> Table {
    if right.is_empty() {
        return if keep_unmatched {
            left.clone()
        } else {
            Table::new()
        };
    }

    let mut out = Table::new();
    for left_row in left {
        let left_key_value = left_row.get(left_key).and_then(Value::join_key);
        let mut matched = false;
        for right_row in right {
            let right_key_value = right_row.get(right_key).and_then(Value::join_key);
            let hit = match (&left_key_value, &right_key_value) {
                (Some(l), Some(r)) => l == r,
                _ => false,
            };
            if !hit {
                continue;
            }
            matched = true;
            let mut merged = left_row.clone();
            for (field, value) in right_row.iter() {
                merged.insert(field.to_owned(), value.clone());
            }
            out.push(merged);
        }
        if !matched && keep_unmatched {
            out.push(left_row.clone());
        }
    }
    out
}
