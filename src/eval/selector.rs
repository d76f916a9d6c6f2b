use std::collections::HashMap;

use tracing::warn;

use crate::db::backend::Backend;
use crate::db::value::ColumnValue;
use crate::error::{DbError, EvalError};
use crate::frame::frame::Frame;
use crate::outcome::{Outcome, Warning};

/// One row of `POP_EVAL` joined to its `POP_EVAL_TYP` rows: the unit of
/// selection `find_evalid` reasons about.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalCandidate {
    pub evalid: i64,
    pub statecd: i64,
    pub end_invyr: i64,
}

/// Discover the EVALIDs matching `statecd`/`eval_type`, optionally restricted
/// to `most_recent` per state. Joins `POP_EVAL` to `POP_EVAL_TYP` on
/// `CN = EVAL_CN`, exactly as the original lookup does, then groups by state
/// and keeps the row with the maximum `END_INVYR` when `most_recent` is set.
pub fn find_evalid(
    backend: &dyn Backend,
    statecd: Option<i64>,
    eval_type: &str,
    most_recent: bool,
) -> Result<Outcome<Vec<i64>>, DbError> {
    if !backend.table_exists("POP_EVAL")? || !backend.table_exists("POP_EVAL_TYP")? {
        return Err(DbError::schema("POP_EVAL / POP_EVAL_TYP not present"));
    }

    let mut sql = String::from(
        "SELECT pe.EVALID, pe.STATECD, pe.END_INVYR \
         FROM POP_EVAL pe \
         JOIN POP_EVAL_TYP pet ON pe.CN = pet.EVAL_CN \
         WHERE pet.EVAL_TYP = ?",
    );
    let mut params = vec![ColumnValue::Text(eval_type.to_string())];
    if let Some(state) = statecd {
        sql.push_str(" AND pe.STATECD = ?");
        params.push(ColumnValue::Int(state));
    }

    let frame = backend.execute(&sql, &params)?;
    if frame.is_empty() {
        warn!(eval_type, "no evaluations found");
        return Ok(Outcome::with_warnings(
            vec![],
            vec![Warning::EmptyMostRecentEvaluation { eval_type: eval_type.to_string() }],
        ));
    }

    let mut candidates: Vec<EvalCandidate> = Vec::with_capacity(frame.num_rows());
    for row in 0..frame.num_rows() {
        candidates.push(EvalCandidate {
            evalid: frame.get(row, "EVALID").as_i64().ok_or(EvalError::MissingEvalidColumn)?,
            statecd: frame.get(row, "STATECD").as_i64().unwrap_or_default(),
            end_invyr: frame.get(row, "END_INVYR").as_i64().unwrap_or_default(),
        });
    }

    if !most_recent {
        let mut evalids: Vec<i64> = candidates.iter().map(|c| c.evalid).collect();
        evalids.sort_unstable();
        evalids.dedup();
        return Ok(Outcome::ok(evalids));
    }

    let mut best_per_state: HashMap<i64, &EvalCandidate> = HashMap::new();
    for c in &candidates {
        best_per_state
            .entry(c.statecd)
            .and_modify(|cur| {
                if c.end_invyr > cur.end_invyr {
                    *cur = c;
                }
            })
            .or_insert(c);
    }
    let mut evalids: Vec<i64> = best_per_state.values().map(|c| c.evalid).collect();
    evalids.sort_unstable();
    Ok(Outcome::ok(evalids))
}

/// Restrict `plot` to rows reachable from `evalids` via `POP_PLOT_STRATUM_ASSGN`.
pub fn clip_frame_by_evalid(backend: &dyn Backend, plot: &Frame, evalids: &[i64]) -> Result<Frame, DbError> {
    if evalids.is_empty() {
        return Ok(plot.gather(&[]));
    }
    let placeholders = std::iter::repeat("?").take(evalids.len()).collect::<Vec<_>>().join(", ");
    let sql = format!(
        "SELECT DISTINCT PLT_CN FROM POP_PLOT_STRATUM_ASSGN WHERE EVALID IN ({placeholders})"
    );
    let params: Vec<ColumnValue> = evalids.iter().map(|&e| ColumnValue::Int(e)).collect();
    let assigned = backend.execute(&sql, &params)?;
    let plt_cns: std::collections::HashSet<String> = (0..assigned.num_rows())
        .filter_map(|r| assigned.get(r, "PLT_CN").as_str().map(|s| s.to_string()))
        .collect();

    let rows: Vec<usize> = (0..plot.num_rows())
        .filter(|&r| plot.get(r, "CN").as_str().map(|cn| plt_cns.contains(cn)).unwrap_or(false))
        .collect();
    Ok(plot.gather(&rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;

    fn fixture() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute(
                "CREATE TABLE POP_EVAL (CN TEXT, EVALID INTEGER, STATECD INTEGER, END_INVYR INTEGER)",
                &[],
            )
            .unwrap();
        backend.execute("CREATE TABLE POP_EVAL_TYP (EVAL_CN TEXT, EVAL_TYP TEXT)", &[]).unwrap();
        backend.execute("INSERT INTO POP_EVAL VALUES ('e1', 372018, 37, 2018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_EVAL VALUES ('e2', 372019, 37, 2019)", &[]).unwrap();
        backend.execute("INSERT INTO POP_EVAL_TYP VALUES ('e1', 'EXPVOL')", &[]).unwrap();
        backend.execute("INSERT INTO POP_EVAL_TYP VALUES ('e2', 'EXPVOL')", &[]).unwrap();
        backend
    }

    #[test]
    fn most_recent_keeps_only_latest_end_invyr_per_state() {
        let backend = fixture();
        let out = find_evalid(&backend, Some(37), "EXPVOL", true).unwrap();
        assert!(out.warnings.is_empty());
        assert_eq!(out.value, vec![372019]);
    }

    #[test]
    fn no_matching_eval_type_produces_warning_not_error() {
        let backend = fixture();
        let out = find_evalid(&backend, Some(37), "EXPGROW", false).unwrap();
        assert!(out.value.is_empty());
        assert_eq!(out.warnings.len(), 1);
    }
}
