use serde::{Deserialize, Serialize};

/// A single cell value. `Text` is the only representation ever produced for
/// CN/`*_CN` columns, regardless of how the backend stores them natively —
/// these are opaque identifiers, never arithmetic, and casting one to a
/// number is a bug wherever it happens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValue {
    Int(i64),
    Float(f64),
    Text(String),
    Null,
}

impl ColumnValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ColumnValue::Int(i) => Some(*i as f64),
            ColumnValue::Float(f) => Some(*f),
            ColumnValue::Text(_) | ColumnValue::Null => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ColumnValue::Int(i) => Some(*i),
            ColumnValue::Float(f) => Some(*f as i64),
            ColumnValue::Text(_) | ColumnValue::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ColumnValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ColumnValue::Null)
    }
}

impl std::fmt::Display for ColumnValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnValue::Int(i) => write!(f, "{i}"),
            ColumnValue::Float(x) => write!(f, "{x}"),
            ColumnValue::Text(s) => write!(f, "{s}"),
            ColumnValue::Null => write!(f, ""),
        }
    }
}

impl From<i64> for ColumnValue {
    fn from(v: i64) -> Self {
        ColumnValue::Int(v)
    }
}

impl From<f64> for ColumnValue {
    fn from(v: f64) -> Self {
        ColumnValue::Float(v)
    }
}

impl From<&str> for ColumnValue {
    fn from(v: &str) -> Self {
        ColumnValue::Text(v.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(v: String) -> Self {
        ColumnValue::Text(v)
    }
}

/// Declared type of a column, independent of the backend's native storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Int,
    Float,
    Text,
}

impl ColumnType {
    /// CN and `*_CN` columns are always declared `Text`, overriding whatever
    /// the backend's native column affinity would otherwise suggest.
    pub fn for_column(name: &str, native_is_integer: bool) -> Self {
        if is_cn_column(name) {
            ColumnType::Text
        } else if native_is_integer {
            ColumnType::Int
        } else {
            ColumnType::Float
        }
    }
}

pub fn is_cn_column(name: &str) -> bool {
    name.eq_ignore_ascii_case("CN") || name.to_ascii_uppercase().ends_with("_CN")
}
