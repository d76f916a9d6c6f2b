pub mod backend;
#[cfg(feature = "duckdb-backend")]
pub mod duckdb_backend;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod value;

pub use backend::Backend;
#[cfg(feature = "duckdb-backend")]
pub use duckdb_backend::DuckdbBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
pub use value::{is_cn_column, ColumnType, ColumnValue};
