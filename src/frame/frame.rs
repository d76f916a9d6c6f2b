use std::collections::HashMap;
use std::sync::Arc;

use crate::db::value::{ColumnType, ColumnValue};

/// Ordered column name -> type mapping for a `Frame`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    names: Vec<String>,
    types: Vec<ColumnType>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(columns: Vec<(String, ColumnType)>) -> Self {
        let mut names = Vec::with_capacity(columns.len());
        let mut types = Vec::with_capacity(columns.len());
        let mut index = HashMap::with_capacity(columns.len());
        for (i, (name, ty)) in columns.into_iter().enumerate() {
            index.insert(name.clone(), i);
            names.push(name);
            types.push(ty);
        }
        Self { names, types, index }
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn type_of(&self, name: &str) -> Option<ColumnType> {
        self.position(name).map(|i| self.types[i])
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A single typed column, stored densely. `Null` is represented as `None` in
/// the typed storage rather than as a sentinel value.
#[derive(Debug, Clone)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, row: usize) -> ColumnValue {
        match self {
            Column::Int(v) => v[row].map(ColumnValue::Int).unwrap_or(ColumnValue::Null),
            Column::Float(v) => v[row].map(ColumnValue::Float).unwrap_or(ColumnValue::Null),
            Column::Text(v) => v[row].clone().map(ColumnValue::Text).unwrap_or(ColumnValue::Null),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::Float(_) => ColumnType::Float,
            Column::Text(_) => ColumnType::Text,
        }
    }

    pub fn gather(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|&r| v[r]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&r| v[r]).collect()),
            Column::Text(v) => Column::Text(rows.iter().map(|&r| v[r].clone()).collect()),
        }
    }

    pub fn concat(&self, other: &Column) -> Column {
        match (self, other) {
            (Column::Int(a), Column::Int(b)) => {
                Column::Int(a.iter().chain(b.iter()).copied().collect())
            }
            (Column::Float(a), Column::Float(b)) => {
                Column::Float(a.iter().chain(b.iter()).copied().collect())
            }
            (Column::Text(a), Column::Text(b)) => {
                Column::Text(a.iter().chain(b.iter()).cloned().collect())
            }
            _ => panic!("concat: mismatched column types"),
        }
    }

    pub fn as_f64_vec(&self) -> Vec<f64> {
        match self {
            Column::Int(v) => v.iter().map(|x| x.unwrap_or(0) as f64).collect(),
            Column::Float(v) => v.iter().map(|x| x.unwrap_or(0.0)).collect(),
            Column::Text(_) => panic!("as_f64_vec: text column"),
        }
    }
}

/// A fully materialized, typed columnar table: the result of `.collect()`ing
/// a `LazyFrame`, or the direct result of `Backend::execute`.
#[derive(Debug, Clone)]
pub struct Frame {
    schema: Schema,
    columns: Vec<Arc<Column>>,
    num_rows: usize,
}

impl Frame {
    pub fn new(schema: Schema, columns: Vec<Column>) -> Self {
        let num_rows = columns.first().map(|c| c.len()).unwrap_or(0);
        for c in &columns {
            debug_assert_eq!(c.len(), num_rows, "all columns in a Frame must have equal length");
        }
        Self { schema, columns: columns.into_iter().map(Arc::new).collect(), num_rows }
    }

    pub fn empty(schema: Schema) -> Self {
        let columns = schema
            .types
            .iter()
            .map(|t| match t {
                ColumnType::Int => Column::Int(Vec::new()),
                ColumnType::Float => Column::Float(Vec::new()),
                ColumnType::Text => Column::Text(Vec::new()),
            })
            .collect();
        Self::new(schema, columns)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.schema.position(name).map(|i| self.columns[i].as_ref())
    }

    pub fn column_at(&self, idx: usize) -> &Column {
        self.columns[idx].as_ref()
    }

    pub fn get(&self, row: usize, col: &str) -> ColumnValue {
        self.column(col).map(|c| c.get(row)).unwrap_or(ColumnValue::Null)
    }

    /// Project to a subset of columns, preserving requested order.
    pub fn select(&self, names: &[&str]) -> Frame {
        let mut cols = Vec::with_capacity(names.len());
        let mut schema_cols = Vec::with_capacity(names.len());
        for &name in names {
            let idx = self.schema.position(name).unwrap_or_else(|| {
                panic!("select: unknown column '{name}'");
            });
            cols.push(self.columns[idx].as_ref().clone());
            schema_cols.push((name.to_string(), self.schema.types[idx]));
        }
        Frame::new(Schema::new(schema_cols), cols)
    }

    /// Filter rows by a boolean mask, preserving schema exactly — an empty
    /// result keeps the expected columns rather than degenerating to none,
    /// so a downstream join or aggregation sees the columns it expects.
    pub fn filter_mask(&self, mask: &[bool]) -> Frame {
        let rows: Vec<usize> = mask.iter().enumerate().filter(|(_, &b)| b).map(|(i, _)| i).collect();
        self.gather(&rows)
    }

    pub fn gather(&self, rows: &[usize]) -> Frame {
        let cols: Vec<Column> = self.columns.iter().map(|c| c.gather(rows)).collect();
        Frame::new(self.schema.clone(), cols)
    }

    /// Vertically concatenate two frames of identical schema.
    pub fn concat(&self, other: &Frame) -> Frame {
        assert_eq!(self.schema.names(), other.schema.names(), "concat: schema mismatch");
        let cols: Vec<Column> =
            self.columns.iter().zip(other.columns.iter()).map(|(a, b)| a.concat(b)).collect();
        Frame::new(self.schema.clone(), cols)
    }

    pub fn sort_by(&self, cols: &[&str]) -> Frame {
        let mut idx: Vec<usize> = (0..self.num_rows).collect();
        let positions: Vec<usize> =
            cols.iter().map(|&c| self.schema.position(c).expect("sort_by: unknown column")).collect();
        idx.sort_by(|&a, &b| {
            for &p in &positions {
                let col = self.columns[p].as_ref();
                let ord = compare_values(col.get(a), col.get(b));
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        self.gather(&idx)
    }
}

fn compare_values(a: ColumnValue, b: ColumnValue) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (ColumnValue::Null, ColumnValue::Null) => Ordering::Equal,
        (ColumnValue::Null, _) => Ordering::Less,
        (_, ColumnValue::Null) => Ordering::Greater,
        (ColumnValue::Text(a), ColumnValue::Text(b)) => a.cmp(&b),
        (a, b) => a
            .as_f64()
            .partial_cmp(&b.as_f64())
            .unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        let schema = Schema::new(vec![
            ("PLT_CN".into(), ColumnType::Text),
            ("DIA".into(), ColumnType::Float),
        ]);
        Frame::new(
            schema,
            vec![
                Column::Text(vec![Some("1".into()), Some("2".into()), Some("3".into())]),
                Column::Float(vec![Some(4.0), Some(12.0), Some(20.0)]),
            ],
        )
    }

    #[test]
    fn select_preserves_order() {
        let f = sample();
        let s = f.select(&["DIA", "PLT_CN"]);
        assert_eq!(s.schema().names(), &["DIA".to_string(), "PLT_CN".to_string()]);
    }

    #[test]
    fn filter_mask_keeps_schema_on_empty_result() {
        let f = sample();
        let filtered = f.filter_mask(&[false, false, false]);
        assert_eq!(filtered.num_rows(), 0);
        assert_eq!(filtered.schema(), f.schema());
    }

    #[test]
    fn sort_by_orders_rows() {
        let f = sample();
        let sorted = f.sort_by(&["DIA"]);
        let dias = sorted.column("DIA").unwrap().as_f64_vec();
        assert_eq!(dias, vec![4.0, 12.0, 20.0]);
    }

    #[test]
    fn concat_stacks_rows() {
        let f = sample();
        let g = f.concat(&f);
        assert_eq!(g.num_rows(), 6);
    }
}
