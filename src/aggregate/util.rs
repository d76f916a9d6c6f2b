//! Grouping primitives shared by every aggregation stage. Grouping on a
//! materialized `Frame` rather than pushing a `GROUP BY` into SQL — by the
//! time the two-stage aggregator runs, the adjustment factors and domain
//! indicators it needs have already been computed row-by-row in Rust and
//! aren't expressible as a SQL aggregate the backend could execute directly.

use std::collections::{HashMap, HashSet};

use crate::db::value::{ColumnType, ColumnValue};
use crate::frame::frame::{Column, Frame, Schema};

/// Sum each of `value_cols` over `frame`, grouped by `group_cols` (order
/// preserved, first-seen-first-out). `group_cols` may be empty, collapsing
/// to a single output row.
pub fn group_sum(frame: &Frame, group_cols: &[&str], value_cols: &[&str]) -> Frame {
    let group_idx: Vec<usize> = group_cols
        .iter()
        .map(|&c| frame.schema().position(c).unwrap_or_else(|| panic!("group_sum: unknown column '{c}'")))
        .collect();

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut sums: HashMap<Vec<String>, Vec<f64>> = HashMap::new();

    for row in 0..frame.num_rows() {
        let key: Vec<String> = group_idx.iter().map(|&i| frame.column_at(i).get(row).to_string()).collect();
        let entry = sums.entry(key.clone()).or_insert_with(|| vec![0.0; value_cols.len()]);
        for (i, &vc) in value_cols.iter().enumerate() {
            entry[i] += frame.get(row, vc).as_f64().unwrap_or(0.0);
        }
        if seen.insert(key.clone()) {
            order.push(key);
        }
    }

    build_grouped_frame(frame, group_cols, &group_idx, value_cols, &order, |key| sums[key].clone())
}

/// Count rows of `frame` grouped by `group_cols`, emitting an `N` column.
pub fn group_count(frame: &Frame, group_cols: &[&str]) -> Frame {
    let group_idx: Vec<usize> = group_cols
        .iter()
        .map(|&c| frame.schema().position(c).unwrap_or_else(|| panic!("group_count: unknown column '{c}'")))
        .collect();

    let mut order: Vec<Vec<String>> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut counts: HashMap<Vec<String>, f64> = HashMap::new();

    for row in 0..frame.num_rows() {
        let key: Vec<String> = group_idx.iter().map(|&i| frame.column_at(i).get(row).to_string()).collect();
        *counts.entry(key.clone()).or_insert(0.0) += 1.0;
        if seen.insert(key.clone()) {
            order.push(key);
        }
    }

    build_grouped_frame(frame, group_cols, &group_idx, &["N"], &order, |key| vec![counts[key]])
}

fn build_grouped_frame(
    frame: &Frame,
    group_cols: &[&str],
    group_idx: &[usize],
    value_cols: &[&str],
    order: &[Vec<String>],
    value_of: impl Fn(&Vec<String>) -> Vec<f64>,
) -> Frame {
    let mut schema_cols: Vec<(String, ColumnType)> =
        group_cols.iter().map(|&c| (c.to_string(), frame.schema().type_of(c).unwrap())).collect();
    for &vc in value_cols {
        schema_cols.push((vc.to_string(), ColumnType::Float));
    }

    let mut group_text: Vec<Vec<Option<String>>> = group_idx.iter().map(|_| Vec::with_capacity(order.len())).collect();
    let mut value_columns: Vec<Vec<Option<f64>>> = value_cols.iter().map(|_| Vec::with_capacity(order.len())).collect();

    for key in order {
        for (i, part) in key.iter().enumerate() {
            group_text[i].push(if part.is_empty() { None } else { Some(part.clone()) });
        }
        for (i, v) in value_of(key).into_iter().enumerate() {
            value_columns[i].push(Some(v));
        }
    }

    let mut columns: Vec<Column> = Vec::with_capacity(group_cols.len() + value_cols.len());
    for (i, &gc) in group_cols.iter().enumerate() {
        columns.push(retype(&group_text[i], frame.schema().type_of(gc).unwrap()));
    }
    for col in value_columns {
        columns.push(Column::Float(col));
    }

    Frame::new(Schema::new(schema_cols), columns)
}

fn retype(values: &[Option<String>], ty: ColumnType) -> Column {
    match ty {
        ColumnType::Int => Column::Int(values.iter().map(|v| v.as_ref().and_then(|s| s.parse::<i64>().ok())).collect()),
        ColumnType::Float => Column::Float(values.iter().map(|v| v.as_ref().and_then(|s| s.parse::<f64>().ok())).collect()),
        ColumnType::Text => Column::Text(values.to_vec()),
    }
}

/// Left-join `left` to `right` on `keys` (same names on both sides),
/// producing exactly `left.num_rows()` output rows in `left`'s order —
/// the zero-extension join used to spread a shared value (e.g. a per-plot
/// land-area denominator) across every row on the left, with `0.0` default
/// for right-side value columns when no match exists.
pub fn left_join_fill(left: &Frame, right: &Frame, keys: &[&str], value_cols: &[&str]) -> Vec<Vec<f64>> {
    let left_idx: Vec<usize> = keys.iter().map(|&k| left.schema().position(k).expect("left_join_fill: key")).collect();
    let right_idx: Vec<usize> = keys.iter().map(|&k| right.schema().position(k).expect("left_join_fill: key")).collect();

    let mut right_index: HashMap<Vec<String>, usize> = HashMap::new();
    for r in 0..right.num_rows() {
        let key: Vec<String> = right_idx.iter().map(|&i| right.column_at(i).get(r).to_string()).collect();
        right_index.insert(key, r);
    }

    let mut out = Vec::with_capacity(left.num_rows());
    for l in 0..left.num_rows() {
        let key: Vec<String> = left_idx.iter().map(|&i| left.column_at(i).get(l).to_string()).collect();
        let row_values = match right_index.get(&key) {
            Some(&r) => value_cols.iter().map(|&vc| right.get(r, vc).as_f64().unwrap_or(0.0)).collect(),
            None => vec![0.0; value_cols.len()],
        };
        out.push(row_values);
    }
    out
}

/// Append a computed `Float` column to `frame`, returning a new `Frame`.
pub fn append_column(frame: &Frame, name: &str, values: Vec<Option<f64>>) -> Frame {
    let mut names: Vec<(String, ColumnType)> =
        frame.schema().names().iter().map(|n| (n.clone(), frame.schema().type_of(n).unwrap())).collect();
    names.push((name.to_string(), ColumnType::Float));

    let mut columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    columns.push(Column::Float(values));

    Frame::new(Schema::new(names), columns)
}

/// Distinct combinations of `group_cols` present in `frame`, in first-seen
/// order.
pub fn distinct_combinations(frame: &Frame, group_cols: &[&str]) -> Vec<Vec<ColumnValue>> {
    let idx: Vec<usize> = group_cols
        .iter()
        .map(|&c| frame.schema().position(c).unwrap_or_else(|| panic!("distinct_combinations: unknown '{c}'")))
        .collect();
    let mut order: Vec<Vec<ColumnValue>> = Vec::new();
    let mut seen: HashSet<Vec<String>> = HashSet::new();
    for row in 0..frame.num_rows() {
        let values: Vec<ColumnValue> = idx.iter().map(|&i| frame.column_at(i).get(row)).collect();
        let key: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        if seen.insert(key) {
            order.push(values);
        }
    }
    order
}

/// Rows of `frame` whose `group_cols` equal `values` exactly.
pub fn filter_to_combination(frame: &Frame, group_cols: &[&str], values: &[ColumnValue]) -> Frame {
    let idx: Vec<usize> = group_cols
        .iter()
        .map(|&c| frame.schema().position(c).unwrap_or_else(|| panic!("filter_to_combination: unknown '{c}'")))
        .collect();
    let rows: Vec<usize> = (0..frame.num_rows())
        .filter(|&row| idx.iter().zip(values).all(|(&i, v)| &frame.column_at(i).get(row) == v))
        .collect();
    frame.gather(&rows)
}
