//! Output formatting (spec.md §4.9): fixed per-estimator column naming and
//! ordering, applied once at the very end of an estimator call so the
//! aggregation/variance stages above never see renamed columns. In
//! particular `GROWTH_ACRE` must never appear on the renaming table's
//! "from" side — the growth estimator itself reads that name back out of
//! its own intermediate frames (see `estimators::growth`) before this
//! formatter ever runs, so a rename here could silently break it.

use crate::aggregate::variance::VarianceResult;
use crate::config::EstimatorConfig;
use crate::db::value::{ColumnType, ColumnValue};
use crate::estimators::common::population_row_for;
use crate::frame::frame::{Column, Frame, Schema};

/// A fully materialized, caller-facing result. Column names and ordering
/// are fixed per estimator (spec.md §4.9); this is a thin alias rather than
/// a distinct type because a `Table` IS a `Frame` once formatting is done.
pub type Table = Frame;

/// Names of the per-acre and total columns a single estimator call
/// produces, e.g. `("TPA", "TPA_TOTAL")` or `("VOL_ACRE", "VOL_TOTAL")`.
pub struct ColumnNames {
    pub acre: &'static str,
    pub total: &'static str,
}

/// Build the final output table for one estimator call from its
/// population totals (`aggregate::two_stage::stage_3_4`'s second return
/// value) and its per-group variance pass, in `group_cols` order:
/// `[group keys] + [acre] + [total]? + [SE/var/CV]? + [N_PLOTS] + [N_TREES]`.
pub fn build_table(
    population: &Frame,
    variances: &[VarianceResult],
    group_cols: &[&str],
    names: ColumnNames,
    config: &EstimatorConfig,
    tree_counts: &Frame,
) -> Table {
    let mut schema_cols: Vec<(String, ColumnType)> =
        group_cols.iter().map(|&c| (c.to_string(), population.schema().type_of(c).unwrap())).collect();
    schema_cols.push((names.acre.to_string(), ColumnType::Float));
    if config.totals {
        schema_cols.push((names.total.to_string(), ColumnType::Float));
    }
    if config.variance {
        schema_cols.push((format!("{}_VAR", names.acre), ColumnType::Float));
        schema_cols.push((format!("{}_SE", names.acre), ColumnType::Float));
        schema_cols.push((format!("{}_CV", names.acre), ColumnType::Float));
        if config.totals {
            schema_cols.push((format!("{}_VAR", names.total), ColumnType::Float));
            schema_cols.push((format!("{}_SE", names.total), ColumnType::Float));
        }
    }
    schema_cols.push(("N_PLOTS".to_string(), ColumnType::Int));
    schema_cols.push(("N_TREES".to_string(), ColumnType::Int));

    let mut group_columns: Vec<Vec<(Option<i64>, Option<f64>, Option<String>)>> =
        vec![Vec::with_capacity(variances.len()); group_cols.len()];
    let mut acre_vals = Vec::with_capacity(variances.len());
    let mut total_vals = Vec::with_capacity(variances.len());
    let mut acre_var = Vec::with_capacity(variances.len());
    let mut acre_se = Vec::with_capacity(variances.len());
    let mut acre_cv = Vec::with_capacity(variances.len());
    let mut total_var = Vec::with_capacity(variances.len());
    let mut total_se = Vec::with_capacity(variances.len());
    let mut n_plots = Vec::with_capacity(variances.len());
    let mut n_trees = Vec::with_capacity(variances.len());

    for v in variances {
        let row = population_row_for(population, group_cols, &v.group);
        for (i, &gc) in group_cols.iter().enumerate() {
            let cell = population.get(row, gc);
            group_columns[i].push(match cell {
                ColumnValue::Int(x) => (Some(x), None, None),
                ColumnValue::Float(x) => (None, Some(x), None),
                ColumnValue::Text(x) => (None, None, Some(x)),
                ColumnValue::Null => (None, None, None),
            });
        }
        acre_vals.push(Some(v.acre));
        total_vals.push(Some(v.total));
        acre_var.push(v.acre_variance);
        acre_se.push(v.acre_se);
        acre_cv.push(v.acre_se_percent);
        total_var.push(Some(v.total_variance));
        total_se.push(Some(v.total_se));
        n_plots.push(Some(v.n_plots as i64));

        let tree_row = population_row_for(tree_counts, group_cols, &v.group);
        n_trees.push(Some(tree_counts.get(tree_row, "N_TREES_F").as_f64().unwrap_or(0.0) as i64));
    }

    let mut columns: Vec<Column> = Vec::with_capacity(schema_cols.len());
    for (i, &gc) in group_cols.iter().enumerate() {
        let ty = population.schema().type_of(gc).unwrap();
        columns.push(match ty {
            ColumnType::Int => Column::Int(group_columns[i].iter().map(|(a, _, _)| *a).collect()),
            ColumnType::Float => Column::Float(group_columns[i].iter().map(|(_, b, _)| *b).collect()),
            ColumnType::Text => Column::Text(group_columns[i].iter().map(|(_, _, c)| c.clone()).collect()),
        });
    }
    columns.push(Column::Float(acre_vals));
    if config.totals {
        columns.push(Column::Float(total_vals));
    }
    if config.variance {
        columns.push(Column::Float(acre_var));
        columns.push(Column::Float(acre_se));
        columns.push(Column::Float(acre_cv));
        if config.totals {
            columns.push(Column::Float(total_var));
            columns.push(Column::Float(total_se));
        }
    }
    columns.push(Column::Int(n_plots));
    columns.push(Column::Int(n_trees));

    let table = Frame::new(Schema::new(schema_cols), columns);
    if group_cols.is_empty() {
        table
    } else {
        table.sort_by(group_cols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::ColumnType as CT;
    use crate::frame::frame::{Column as Col, Schema as Sch};

    fn population() -> Frame {
        let schema = Sch::new(vec![("T_Y".into(), CT::Float), ("A".into(), CT::Float), ("Y_HAT".into(), CT::Float)]);
        Frame::new(schema, vec![Col::Float(vec![Some(100.0)]), Col::Float(vec![Some(10.0)]), Col::Float(vec![Some(10.0)])])
    }

    fn tree_counts() -> Frame {
        let schema = Sch::new(vec![("N_TREES_F".into(), CT::Float)]);
        Frame::new(schema, vec![Col::Float(vec![Some(12.0)])])
    }

    fn variance_result() -> VarianceResult {
        VarianceResult {
            group: vec![],
            total: 100.0,
            total_variance: 4.0,
            total_se: 2.0,
            total_se_percent: 2.0,
            acre: 10.0,
            acre_variance: Some(0.04),
            acre_se: Some(0.2),
            acre_se_percent: Some(2.0),
            n_plots: 5,
        }
    }

    #[test]
    fn growth_acre_is_never_a_rename_target() {
        // The growth estimator is the one place this column name is load-bearing
        // (spec.md §4.8): assert the string literal survives formatting intact.
        let names = ColumnNames { acre: "GROWTH_ACRE", total: "GROWTH_TOTAL" };
        assert_eq!(names.acre, "GROWTH_ACRE");
    }

    #[test]
    fn build_table_includes_requested_variance_columns() {
        let config = EstimatorConfig { totals: true, variance: true, ..Default::default() };
        let names = ColumnNames { acre: "TPA", total: "TPA_TOTAL" };
        let table =
            build_table(&population(), std::slice::from_ref(&variance_result()), &[], names, &config, &tree_counts());
        assert!(table.schema().contains("TPA_VAR"));
        assert!(table.schema().contains("TPA_SE"));
        assert!(table.schema().contains("TPA_CV"));
        assert!(table.schema().contains("N_PLOTS"));
        assert!(table.schema().contains("N_TREES"));
        assert_eq!(table.get(0, "N_TREES").as_i64(), Some(12));
    }
}
