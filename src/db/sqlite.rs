use std::sync::Mutex;

use rusqlite::types::ValueRef;
use rusqlite::Connection;
use tracing::debug;

use crate::db::backend::Backend;
use crate::db::value::{is_cn_column, ColumnType, ColumnValue};
use crate::error::DbError;
use crate::frame::frame::{Column, Frame, Schema};

/// Row-oriented backend over a local SQLite file (or `:memory:`), the
/// reference format most FIA state extracts ship in.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: &str) -> Result<Self, DbError> {
        let conn = Connection::open(path).map_err(|e| DbError::connect(path).with_source(e))?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| DbError::connect(":memory:").with_source(e))?;
        Ok(Self { conn: Mutex::new(conn) })
    }
}

fn bind_param(v: &ColumnValue) -> Box<dyn rusqlite::types::ToSql> {
    match v {
        ColumnValue::Int(i) => Box::new(*i),
        ColumnValue::Float(f) => Box::new(*f),
        ColumnValue::Text(s) => Box::new(s.clone()),
        ColumnValue::Null => Box::new(Option::<i64>::None),
    }
}

fn value_ref_to_column_value(v: ValueRef<'_>, force_text: bool) -> ColumnValue {
    if force_text {
        return match v {
            ValueRef::Null => ColumnValue::Null,
            ValueRef::Integer(i) => ColumnValue::Text(i.to_string()),
            ValueRef::Real(f) => ColumnValue::Text(f.to_string()),
            ValueRef::Text(t) => ColumnValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(_) => ColumnValue::Null,
        };
    }
    match v {
        ValueRef::Null => ColumnValue::Null,
        ValueRef::Integer(i) => ColumnValue::Int(i),
        ValueRef::Real(f) => ColumnValue::Float(f),
        ValueRef::Text(t) => ColumnValue::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(_) => ColumnValue::Null,
    }
}

impl Backend for SqliteBackend {
    fn execute(&self, sql: &str, params: &[ColumnValue]) -> Result<Frame, DbError> {
        debug!(rows_bound = params.len(), "executing query");
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| DbError::query(sql.to_string()).with_source(e))?;

        let col_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let bound: Vec<Box<dyn rusqlite::types::ToSql>> = params.iter().map(bind_param).collect();
        let bound_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut rows = stmt
            .query(bound_refs.as_slice())
            .map_err(|e| DbError::query(sql.to_string()).with_source(e))?;

        let force_text: Vec<bool> = col_names.iter().map(|n| is_cn_column(n)).collect();
        let mut raw_rows: Vec<Vec<ColumnValue>> = Vec::new();
        while let Some(row) = rows.next().map_err(|e| DbError::query(sql.to_string()).with_source(e))? {
            let mut out = Vec::with_capacity(col_names.len());
            for i in 0..col_names.len() {
                let vref = row
                    .get_ref(i)
                    .map_err(|e| DbError::query(sql.to_string()).with_source(e))?;
                out.push(value_ref_to_column_value(vref, force_text[i]));
            }
            raw_rows.push(out);
        }
        drop(rows);
        drop(stmt);

        Ok(rows_to_frame(col_names, raw_rows))
    }

    fn schema(&self, table: &str) -> Result<Schema, DbError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .map_err(|e| DbError::schema(table.to_string()).with_source(e))?;
        let mut cols = Vec::new();
        let mut rows = stmt
            .query([])
            .map_err(|e| DbError::schema(table.to_string()).with_source(e))?;
        while let Some(row) = rows.next().map_err(|e| DbError::schema(table.to_string()).with_source(e))? {
            let name: String = row.get(1).map_err(|e| DbError::schema(table.to_string()).with_source(e))?;
            let decl_type: String = row.get(2).map_err(|e| DbError::schema(table.to_string()).with_source(e))?;
            let native_is_integer = decl_type.to_ascii_uppercase().contains("INT");
            cols.push((name.clone(), ColumnType::for_column(&name, native_is_integer)));
        }
        if cols.is_empty() {
            return Err(DbError::schema(format!("table '{table}' not found")));
        }
        Ok(Schema::new(cols))
    }

    fn table_exists(&self, table: &str) -> Result<bool, DbError> {
        let conn = self.conn.lock().expect("sqlite connection mutex poisoned");
        let mut stmt = conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type='table' AND name=?")
            .map_err(|e| DbError::query("table_exists".to_string()).with_source(e))?;
        let exists = stmt
            .exists([table])
            .map_err(|e| DbError::query("table_exists".to_string()).with_source(e))?;
        Ok(exists)
    }

    fn describe_table(&self, table: &str) -> Result<Frame, DbError> {
        self.execute(&format!("SELECT * FROM {table} LIMIT 0"), &[])
    }
}

fn rows_to_frame(col_names: Vec<String>, raw_rows: Vec<Vec<ColumnValue>>) -> Frame {
    let num_cols = col_names.len();
    let mut col_types = vec![None; num_cols];
    for row in &raw_rows {
        for (i, v) in row.iter().enumerate() {
            if col_types[i].is_none() {
                col_types[i] = match v {
                    ColumnValue::Int(_) => Some(ColumnType::Int),
                    ColumnValue::Float(_) => Some(ColumnType::Float),
                    ColumnValue::Text(_) => Some(ColumnType::Text),
                    ColumnValue::Null => None,
                };
            }
        }
    }
    let types: Vec<ColumnType> = col_types
        .into_iter()
        .enumerate()
        .map(|(i, t)| t.unwrap_or_else(|| ColumnType::for_column(&col_names[i], false)))
        .collect();

    let mut columns: Vec<Column> = types
        .iter()
        .map(|t| match t {
            ColumnType::Int => Column::Int(Vec::with_capacity(raw_rows.len())),
            ColumnType::Float => Column::Float(Vec::with_capacity(raw_rows.len())),
            ColumnType::Text => Column::Text(Vec::with_capacity(raw_rows.len())),
        })
        .collect();

    for row in raw_rows {
        for (i, v) in row.into_iter().enumerate() {
            match (&mut columns[i], v) {
                (Column::Int(c), ColumnValue::Int(x)) => c.push(Some(x)),
                (Column::Int(c), ColumnValue::Null) => c.push(None),
                (Column::Float(c), ColumnValue::Float(x)) => c.push(Some(x)),
                (Column::Float(c), ColumnValue::Int(x)) => c.push(Some(x as f64)),
                (Column::Float(c), ColumnValue::Null) => c.push(None),
                (Column::Text(c), ColumnValue::Text(x)) => c.push(Some(x)),
                (Column::Text(c), ColumnValue::Null) => c.push(None),
                _ => {}
            }
        }
    }

    let schema = Schema::new(col_names.into_iter().zip(types).collect());
    Frame::new(schema, columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_roundtrips_a_simple_table() {
        let backend = SqliteBackend::in_memory().unwrap();
        {
            let conn = backend.conn.lock().unwrap();
            conn.execute_batch(
                "CREATE TABLE plot (PLT_CN TEXT, STATECD INTEGER, ACRES REAL);
                 INSERT INTO plot VALUES ('100', 37, 0.2);
                 INSERT INTO plot VALUES ('101', 37, 0.25);",
            )
            .unwrap();
        }
        let frame = backend.execute("SELECT * FROM plot ORDER BY PLT_CN", &[]).unwrap();
        assert_eq!(frame.num_rows(), 2);
        assert_eq!(frame.schema().type_of("PLT_CN"), Some(ColumnType::Text));
        assert_eq!(frame.get(0, "PLT_CN"), ColumnValue::Text("100".to_string()));
    }

    #[test]
    fn schema_forces_cn_columns_to_text_even_when_declared_integer() {
        let backend = SqliteBackend::in_memory().unwrap();
        {
            let conn = backend.conn.lock().unwrap();
            conn.execute_batch("CREATE TABLE t (CN INTEGER, VAL REAL);").unwrap();
        }
        let schema = backend.schema("t").unwrap();
        assert_eq!(schema.type_of("CN"), Some(ColumnType::Text));
    }

    #[test]
    fn table_exists_reports_absence() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(!backend.table_exists("nope").unwrap());
    }
}
