use tracing::debug;

use crate::db::backend::Backend;
use crate::db::value::ColumnValue;
use crate::error::DbError;
use crate::frame::expr::Predicate;
use crate::frame::frame::Frame;
use crate::frame::join::{choose_strategy, hash_join, JoinCache, JoinFingerprint, JoinHow};

/// Deferred computation graph for a `LazyFrame`. Nothing touches the backend
/// until `.collect()` walks the tree; building a `LazyFrame` only ever
/// allocates plan nodes.
#[derive(Debug, Clone)]
pub enum Plan {
    Scan { table: String, columns: Option<Vec<String>>, filter: Option<Predicate> },
    Filter { input: Box<Plan>, predicate: Predicate },
    Select { input: Box<Plan>, columns: Vec<String> },
    Join { left: Box<Plan>, right: Box<Plan>, left_keys: Vec<String>, right_keys: Vec<String>, how: JoinHow },
    Sort { input: Box<Plan>, columns: Vec<String> },
    Union { inputs: Vec<Plan> },
}

/// A table reference with a plan attached instead of materialized rows.
/// Predicates and projections fold into the originating `Scan` wherever the
/// plan shape allows it, so a filter written right after a scan becomes part
/// of the `WHERE` clause instead of a second pass over materialized rows.
#[derive(Debug, Clone)]
pub struct LazyFrame {
    plan: Plan,
}

impl LazyFrame {
    pub fn scan(table: impl Into<String>) -> Self {
        Self { plan: Plan::Scan { table: table.into(), columns: None, filter: None } }
    }

    pub fn filter(self, predicate: Predicate) -> Self {
        Self { plan: Plan::Filter { input: Box::new(self.plan), predicate } }
    }

    pub fn select(self, columns: Vec<String>) -> Self {
        Self { plan: Plan::Select { input: Box::new(self.plan), columns } }
    }

    pub fn join(self, other: LazyFrame, left_keys: Vec<String>, right_keys: Vec<String>, how: JoinHow) -> Self {
        Self {
            plan: Plan::Join {
                left: Box::new(self.plan),
                right: Box::new(other.plan),
                left_keys,
                right_keys,
                how,
            },
        }
    }

    pub fn sort(self, columns: Vec<String>) -> Self {
        Self { plan: Plan::Sort { input: Box::new(self.plan), columns } }
    }

    pub fn union(frames: Vec<LazyFrame>) -> Self {
        Self { plan: Plan::Union { inputs: frames.into_iter().map(|f| f.plan).collect() } }
    }

    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    /// Fold `Filter`/`Select` nodes directly above a `Scan` into the scan
    /// itself, so the backend sees one `WHERE`/projected `SELECT` instead of
    /// a full-table pull followed by in-memory work.
    fn optimize(&self) -> Plan {
        fold(self.plan.clone())
    }

    pub fn collect(&self, backend: &dyn Backend, cache: Option<&JoinCache>) -> Result<Frame, DbError> {
        execute(&self.optimize(), backend, cache)
    }
}

fn fold(plan: Plan) -> Plan {
    match plan {
        Plan::Filter { input, predicate } => {
            let input = fold(*input);
            match input {
                Plan::Scan { table, columns, filter: None } => {
                    Plan::Scan { table, columns, filter: Some(predicate) }
                }
                Plan::Scan { table, columns, filter: Some(existing) } => Plan::Scan {
                    table,
                    columns,
                    filter: Some(Predicate::And(Box::new(existing), Box::new(predicate))),
                },
                other => Plan::Filter { input: Box::new(other), predicate },
            }
        }
        Plan::Select { input, columns } => {
            let input = fold(*input);
            match input {
                Plan::Scan { table, columns: None, filter } => {
                    Plan::Scan { table, columns: Some(columns), filter }
                }
                other => Plan::Select { input: Box::new(other), columns },
            }
        }
        Plan::Join { left, right, left_keys, right_keys, how } => Plan::Join {
            left: Box::new(fold(*left)),
            right: Box::new(fold(*right)),
            left_keys,
            right_keys,
            how,
        },
        Plan::Sort { input, columns } => Plan::Sort { input: Box::new(fold(*input)), columns },
        Plan::Union { inputs } => Plan::Union { inputs: inputs.into_iter().map(fold).collect() },
        scan @ Plan::Scan { .. } => scan,
    }
}

fn execute(plan: &Plan, backend: &dyn Backend, cache: Option<&JoinCache>) -> Result<Frame, DbError> {
    match plan {
        Plan::Scan { table, columns, filter } => {
            let projection = columns
                .as_ref()
                .map(|c| c.join(", "))
                .unwrap_or_else(|| "*".to_string());
            let (where_sql, params): (String, Vec<ColumnValue>) = match filter {
                Some(p) => {
                    let (sql, params) = p.to_sql();
                    (format!(" WHERE {sql}"), params)
                }
                None => (String::new(), vec![]),
            };
            let sql = format!("SELECT {projection} FROM {table}{where_sql}");
            backend.execute(&sql, &params)
        }
        Plan::Filter { input, predicate } => {
            let frame = execute(input, backend, cache)?;
            let mask: Vec<bool> = (0..frame.num_rows()).map(|r| predicate.eval(&frame, r)).collect();
            Ok(frame.filter_mask(&mask))
        }
        Plan::Select { input, columns } => {
            let frame = execute(input, backend, cache)?;
            let refs: Vec<&str> = columns.iter().map(|s| s.as_str()).collect();
            Ok(frame.select(&refs))
        }
        Plan::Join { left, right, left_keys, right_keys, how } => {
            let left_frame = execute(left, backend, cache)?;
            let right_frame = execute(right, backend, cache)?;
            let left_refs: Vec<&str> = left_keys.iter().map(|s| s.as_str()).collect();
            let right_refs: Vec<&str> = right_keys.iter().map(|s| s.as_str()).collect();

            let fp = JoinFingerprint::new(&left_frame, &right_frame, &left_refs, &right_refs, *how);
            if let Some(cache) = cache {
                if let Some(hit) = cache.get(&fp) {
                    debug!("join cache hit");
                    return Ok(hit);
                }
            }

            let strategy = choose_strategy(left_frame.num_rows(), right_frame.num_rows());
            debug!(?strategy, "join strategy selected");
            let result = hash_join(&left_frame, &right_frame, &left_refs, &right_refs, *how);
            if let Some(cache) = cache {
                cache.put(&fp, result.clone());
            }
            Ok(result)
        }
        Plan::Sort { input, columns } => {
            let frame = execute(input, backend, cache)?;
            let refs: Vec<&str> = columns.iter().map(|s| s.as_str()).collect();
            Ok(frame.sort_by(&refs))
        }
        Plan::Union { inputs } => {
            let mut frames = inputs.iter().map(|p| execute(p, backend, cache));
            let first = frames
                .next()
                .ok_or_else(|| DbError::query("union of zero inputs".to_string()))??;
            frames.try_fold(first, |acc, next| Ok(acc.concat(&next?)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;
    use crate::frame::expr::{CmpOp, Literal};

    fn backend() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute(
                "CREATE TABLE tree (CN TEXT, PLT_CN TEXT, DIA REAL, STATUSCD INTEGER)",
                &[],
            )
            .unwrap();
        backend.execute("INSERT INTO tree VALUES ('1','p1',4.0,1)", &[]).unwrap();
        backend.execute("INSERT INTO tree VALUES ('2','p1',12.0,1)", &[]).unwrap();
        backend.execute("INSERT INTO tree VALUES ('3','p2',20.0,2)", &[]).unwrap();
        backend
    }

    #[test]
    fn filter_folds_into_scan_where_clause() {
        let lazy = LazyFrame::scan("tree").filter(Predicate::Cmp {
            op: CmpOp::Gt,
            lhs: Box::new(Predicate::Column("DIA".into())),
            rhs: Box::new(Predicate::Literal(Literal::Number(5.0))),
        });
        match lazy.optimize() {
            Plan::Scan { filter: Some(_), .. } => {}
            other => panic!("expected folded scan, got {other:?}"),
        }
    }

    #[test]
    fn collect_applies_pushed_down_filter() {
        let backend = backend();
        let lazy = LazyFrame::scan("tree").filter(Predicate::Cmp {
            op: CmpOp::Eq,
            lhs: Box::new(Predicate::Column("STATUSCD".into())),
            rhs: Box::new(Predicate::Literal(Literal::Number(1.0))),
        });
        let frame = lazy.collect(&backend, None).unwrap();
        assert_eq!(frame.num_rows(), 2);
    }

    #[test]
    fn select_folds_into_scan_projection() {
        let lazy = LazyFrame::scan("tree").select(vec!["DIA".into()]);
        match lazy.optimize() {
            Plan::Scan { columns: Some(c), .. } => assert_eq!(c, vec!["DIA".to_string()]),
            other => panic!("expected folded projection, got {other:?}"),
        }
    }
}
