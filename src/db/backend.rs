use crate::db::value::ColumnValue;
use crate::error::DbError;
use crate::frame::frame::{Frame, Schema};

/// Maximum number of literals placed in a single `IN (...)` clause before a
/// query is split into chunks and unioned. SQLite and DuckDB both choke on
/// parameter lists in the tens of thousands; this keeps every backend well
/// under that regardless of how many plot CNs an EVALID clip selects.
pub const MAX_IN_LIST: usize = 900;

/// Uniform storage interface implemented by each concrete database adapter.
/// Every method logs the statement shape via `tracing` but never the bound
/// parameter values themselves — CNs and domain literals can be numerous and
/// are not useful in a log line, only the row/column counts are.
pub trait Backend: Send + Sync {
    fn execute(&self, sql: &str, params: &[ColumnValue]) -> Result<Frame, DbError>;

    fn schema(&self, table: &str) -> Result<Schema, DbError>;

    fn table_exists(&self, table: &str) -> Result<bool, DbError>;

    fn describe_table(&self, table: &str) -> Result<Frame, DbError>;
}

/// Split `values` into chunks of at most `MAX_IN_LIST` items, each ready to
/// be spliced into its own `IN (...)` clause.
pub fn chunk_in_list<T: Clone>(values: &[T]) -> Vec<&[T]> {
    if values.is_empty() {
        return vec![values];
    }
    values.chunks(MAX_IN_LIST).collect()
}

/// Build a parameterized `column IN (?, ?, ...)` fragment for one chunk.
pub fn in_clause(column: &str, chunk_len: usize) -> String {
    let placeholders = std::iter::repeat("?").take(chunk_len).collect::<Vec<_>>().join(", ");
    format!("{column} IN ({placeholders})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_in_list_splits_at_boundary() {
        let values: Vec<i64> = (0..2001).collect();
        let chunks = chunk_in_list(&values);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), MAX_IN_LIST);
        assert_eq!(chunks[2].len(), 2001 - 2 * MAX_IN_LIST);
    }

    #[test]
    fn chunk_in_list_empty_returns_one_empty_chunk() {
        let values: Vec<i64> = Vec::new();
        let chunks = chunk_in_list(&values);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_empty());
    }
}
