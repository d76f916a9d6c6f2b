//! `Outcome<T>` separates hard failures (`FiaError`, propagated via `?`) from
//! recoverable conditions that still produce a usable result: an unknown
//! grouping column, or a most-recent-evaluation lookup that found nothing.
//! Those are surfaced as warnings attached to the value rather than as errors.

use serde::Serialize;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum Warning {
    UnknownGroupColumn { column: String },
    EmptyMostRecentEvaluation { eval_type: String },
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Warning::UnknownGroupColumn { column } => {
                write!(f, "unknown grouping column '{column}' (treated as user-derived)")
            }
            Warning::EmptyMostRecentEvaluation { eval_type } => {
                write!(f, "no evaluations found for type {eval_type}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn ok(value: T) -> Self {
        Self { value, warnings: Vec::new() }
    }

    pub fn with_warnings(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn push_warning(&mut self, w: Warning) {
        self.warnings.push(w);
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome { value: f(self.value), warnings: self.warnings }
    }
}
