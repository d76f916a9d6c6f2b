use std::collections::{HashMap, HashSet};

use crate::db::backend::Backend;
use crate::db::value::ColumnValue;
use crate::error::{DbError, StratError};
use crate::frame::frame::{Frame, Schema};
use crate::frame::join::{hash_join, JoinHow};

/// Loads the stratification chain for a set of plots under an active EVALID
/// set: `POP_PLOT_STRATUM_ASSGN` -> `POP_STRATUM` -> `POP_ESTN_UNIT`. Every
/// plot CN present in `plot_cns` must resolve to exactly one stratum; a plot
/// with no assignment is a hard error rather than a silent zero contribution,
/// since an omitted stratum weight would understate the population total.
pub struct StratificationLoader;

impl StratificationLoader {
    pub fn load(backend: &dyn Backend, evalids: &[i64], plot_cns: &[String]) -> Result<Frame, DbError> {
        if plot_cns.is_empty() {
            return Ok(Frame::empty(Schema::new(vec![])));
        }

        let evalid_placeholders = std::iter::repeat("?").take(evalids.len()).collect::<Vec<_>>().join(", ");
        let sql = format!(
            "SELECT PLT_CN, STRATUM_CN, EVALID FROM POP_PLOT_STRATUM_ASSGN WHERE EVALID IN ({evalid_placeholders})"
        );
        let params: Vec<ColumnValue> = evalids.iter().map(|&e| ColumnValue::Int(e)).collect();
        let ppsa = backend.execute(&sql, &params)?;

        let stratum = backend.execute(
            "SELECT CN AS STRATUM_CN, ESTN_UNIT_CN, EXPNS, ADJ_FACTOR_MICR, ADJ_FACTOR_SUBP, \
             ADJ_FACTOR_MACR, P1POINTCNT, P2POINTCNT FROM POP_STRATUM",
            &[],
        )?;
        let estn_unit = backend.execute(
            "SELECT CN AS ESTN_UNIT_CN, AREA_USED, P1PNTCNT_EU, P2PNTCNT_EU FROM POP_ESTN_UNIT",
            &[],
        )?;

        let joined = hash_join(&ppsa, &stratum, &["STRATUM_CN"], &["STRATUM_CN"], JoinHow::Left);
        let joined = hash_join(&joined, &estn_unit, &["ESTN_UNIT_CN"], &["ESTN_UNIT_CN"], JoinHow::Left);

        let wanted: HashSet<&str> = plot_cns.iter().map(|s| s.as_str()).collect();
        let rows: Vec<usize> = (0..joined.num_rows())
            .filter(|&r| joined.get(r, "PLT_CN").as_str().map(|cn| wanted.contains(cn)).unwrap_or(false))
            .collect();
        let result = joined.gather(&rows);

        let present: HashSet<&str> = (0..result.num_rows())
            .filter_map(|r| result.get(r, "PLT_CN").as_str())
            .collect();
        for cn in plot_cns {
            if !present.contains(cn.as_str()) {
                return Err(DbError::query(StratError::MissingStratum { plt_cn: cn.clone() }.to_string()));
            }
        }

        Ok(with_stratum_weight(&result))
    }
}

/// Append `W_H = P1POINTCNT / P1PNTCNT_EU` as a column, computed once per row
/// here rather than recomputed by every caller (spec.md §4.5 step 4).
fn with_stratum_weight(frame: &Frame) -> Frame {
    let w_h: Vec<Option<f64>> = (0..frame.num_rows())
        .map(|r| {
            let p1 = frame.get(r, "P1POINTCNT").as_f64()?;
            let p1_eu = frame.get(r, "P1PNTCNT_EU").as_f64()?;
            if p1_eu == 0.0 {
                None
            } else {
                Some(p1 / p1_eu)
            }
        })
        .collect();

    let mut names: Vec<(String, crate::db::value::ColumnType)> = frame
        .schema()
        .names()
        .iter()
        .map(|n| (n.clone(), frame.schema().type_of(n).unwrap()))
        .collect();
    names.push(("W_H".to_string(), crate::db::value::ColumnType::Float));

    let mut columns: Vec<crate::frame::frame::Column> =
        (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    columns.push(crate::frame::frame::Column::Float(w_h));

    Frame::new(Schema::new(names), columns)
}

/// Number of distinct plots contributing to each stratum (`P2POINTCNT`
/// override when present, falling back to the number of plots actually
/// assigned — used by `aggregate::variance` to decide the `n_h <= 1` case).
pub fn plots_per_stratum(strat: &Frame) -> HashMap<String, usize> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for row in 0..strat.num_rows() {
        if let Some(stratum_cn) = strat.get(row, "STRATUM_CN").as_str() {
            *counts.entry(stratum_cn.to_string()).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;

    fn fixture() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute("CREATE TABLE POP_PLOT_STRATUM_ASSGN (PLT_CN TEXT, STRATUM_CN TEXT, EVALID INTEGER)", &[])
            .unwrap();
        backend
            .execute(
                "CREATE TABLE POP_STRATUM (CN TEXT, ESTN_UNIT_CN TEXT, EXPNS REAL, \
                 ADJ_FACTOR_MICR REAL, ADJ_FACTOR_SUBP REAL, ADJ_FACTOR_MACR REAL, \
                 P1POINTCNT INTEGER, P2POINTCNT INTEGER)",
                &[],
            )
            .unwrap();
        backend
            .execute(
                "CREATE TABLE POP_ESTN_UNIT (CN TEXT, AREA_USED REAL, P1PNTCNT_EU INTEGER, P2PNTCNT_EU INTEGER)",
                &[],
            )
            .unwrap();

        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p2','s1',372018)", &[]).unwrap();
        backend
            .execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',6000.0,1.0,1.0,1.0,10,10)", &[])
            .unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 20, 20)", &[]).unwrap();
        backend
    }

    #[test]
    fn load_resolves_stratum_for_every_requested_plot() {
        let backend = fixture();
        let plots = vec!["p1".to_string(), "p2".to_string()];
        let result = StratificationLoader::load(&backend, &[372018], &plots).unwrap();
        assert_eq!(result.num_rows(), 2);
        let w_h = result.column("W_H").unwrap().as_f64_vec();
        assert!(w_h.iter().all(|&w| (w - 0.5).abs() < 1e-9));
    }

    #[test]
    fn load_errors_on_plot_with_no_stratum_assignment() {
        let backend = fixture();
        let plots = vec!["p1".to_string(), "missing".to_string()];
        let err = StratificationLoader::load(&backend, &[372018], &plots).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
