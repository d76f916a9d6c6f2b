//! Two-stage aggregation: tree -> plot x condition -> plot -> stratum ->
//! population, per spec.md §4.6. Expansion (`EXPNS`) is applied only after
//! condition-level aggregation completes — applying it earlier is the bug
//! that once underestimated TPA by 26x.

use std::collections::HashMap;

use crate::aggregate::adjustment::{cond_adj_factor, grm_adj_factor, tree_adj_factor};
use crate::aggregate::util::{append_column, distinct_combinations, filter_to_combination, group_sum, left_join_fill};
use crate::db::value::{ColumnType, ColumnValue};
use crate::frame::frame::{Column, Frame, Schema};

/// Per-plot numerator/denominator sample, zero-extended across every plot
/// in the relevant strata (spec.md §4.7's "variance must be taken on
/// zero-extended samples" requirement) and carrying the stratification
/// attributes `aggregate::variance` needs.
pub struct PlotLevel {
    pub frame: Frame,
}

/// Stratum-level population totals, one row per (stratum, group) pair.
pub struct StratumLevel {
    pub frame: Frame,
}

/// Final per-acre and total estimates, one row per group.
pub struct Population {
    pub frame: Frame,
}

pub struct TwoStageResult {
    pub plot_level: PlotLevel,
    pub stratum_level: StratumLevel,
    pub population: Population,
    /// Per-group count of in-domain tree records contributing to this
    /// call, one row per `group_cols_full` combination plus an `N_TREES_F`
    /// column (spec.md §4.9's `N_TREES` output column). Condition-only
    /// estimators (area) never load a tree frame, so every group reports
    /// zero. Computed once here rather than re-derived after a temporal
    /// re-weighting pass, since the tree count itself doesn't change with
    /// plot weighting.
    pub tree_counts: Frame,
}

/// Runs Stage 1-4 for a single value column.
///
/// `tree` is `None` for condition-only estimators (area); otherwise it must
/// already carry `TREE_BASIS`, `tDOMAIN_IND`, `PLT_CN`, `CONDID`, the three
/// `ADJ_FACTOR_*` columns (broadcast from the stratification frame), and
/// `value_col` (the raw per-tree, per-acre contribution `v_t`, not yet
/// scaled by adjustment or domain indicator).
///
/// `cond` must carry `PLT_CN`, `CONDID`, `CONDPROP_UNADJ`, `PROP_BASIS`,
/// `DOMAIN_IND`, and the three `ADJ_FACTOR_*` columns.
///
/// `strat` must carry `PLT_CN`, `STRATUM_CN`, `EXPNS`, `W_H` (one row per
/// plot, as produced by `StratificationLoader::load`).
///
/// `group_cols_full` is the complete grouping key (tree-level and
/// condition-level columns together); `group_cols_cond` is the
/// condition-level subset of it. The denominator is aggregated only by the
/// condition-level subset so a tree-level group (e.g. species) shares one
/// land-area denominator across every group value present on a plot,
/// matching spec.md §4.6's "totals for a given g partition exactly" clause.
pub fn aggregate(
    tree: Option<&Frame>,
    cond: &Frame,
    strat: &Frame,
    value_col: &str,
    group_cols_full: &[&str],
    group_cols_cond: &[&str],
) -> TwoStageResult {
    aggregate_with_adj(tree, cond, strat, value_col, group_cols_full, group_cols_cond, tree_adj_factor)
}

/// Identical to [`aggregate`] but for GRM estimators (growth/mortality/
/// removals), whose tree-level adjustment factor is selected by
/// `SUBPTYP_GRM` rather than `TREE_BASIS` (spec.md §4.6's adjustment table,
/// "GRM" row). `subptyp_col` names the `SUBPTYP_GRM`-equivalent column
/// already present on `tree` (e.g. `SUBP_SUBPTYP_GRM_GS_FOREST`).
pub fn aggregate_grm(
    tree: &Frame,
    cond: &Frame,
    strat: &Frame,
    value_col: &str,
    subptyp_col: &'static str,
    group_cols_full: &[&str],
    group_cols_cond: &[&str],
) -> TwoStageResult {
    aggregate_with_adj(Some(tree), cond, strat, value_col, group_cols_full, group_cols_cond, move |f, r| {
        grm_adj_factor(f, r, subptyp_col)
    })
}

fn aggregate_with_adj(
    tree: Option<&Frame>,
    cond: &Frame,
    strat: &Frame,
    value_col: &str,
    group_cols_full: &[&str],
    group_cols_cond: &[&str],
    tree_adj: impl Fn(&Frame, usize) -> f64,
) -> TwoStageResult {
    let (num_value_col, y_plot_num) = match tree {
        Some(tree) => {
            let contrib: Vec<Option<f64>> = (0..tree.num_rows())
                .map(|r| {
                    let v = tree.get(r, value_col).as_f64().unwrap_or(0.0);
                    let adj = tree_adj(tree, r);
                    let dom = tree.get(r, "tDOMAIN_IND").as_f64().unwrap_or(0.0);
                    Some(v * adj * dom)
                })
                .collect();
            let tree_c = append_column(tree, "TREE_CONTRIB", contrib);

            let mut cond_group: Vec<&str> = vec!["PLT_CN", "CONDID"];
            cond_group.extend_from_slice(group_cols_full);
            let y_cond = group_sum(&tree_c, &cond_group, &["TREE_CONTRIB"]);

            let mut plot_group: Vec<&str> = vec!["PLT_CN"];
            plot_group.extend_from_slice(group_cols_full);
            ("TREE_CONTRIB", group_sum(&y_cond, &plot_group, &["TREE_CONTRIB"]))
        }
        None => {
            let contrib: Vec<Option<f64>> = (0..cond.num_rows())
                .map(|r| {
                    let prop = cond.get(r, "CONDPROP_UNADJ").as_f64().unwrap_or(0.0);
                    let adj = cond_adj_factor(cond, r);
                    let dom = cond.get(r, "DOMAIN_IND").as_f64().unwrap_or(0.0);
                    Some(prop * adj * dom)
                })
                .collect();
            let cond_c = append_column(cond, "COND_NUM", contrib);

            let mut plot_group: Vec<&str> = vec!["PLT_CN"];
            plot_group.extend_from_slice(group_cols_full);
            ("COND_NUM", group_sum(&cond_c, &plot_group, &["COND_NUM"]))
        }
    };

    let den_contrib: Vec<Option<f64>> = (0..cond.num_rows())
        .map(|r| {
            let prop = cond.get(r, "CONDPROP_UNADJ").as_f64().unwrap_or(0.0);
            let adj = cond_adj_factor(cond, r);
            Some(prop * adj)
        })
        .collect();
    let cond_d = append_column(cond, "COND_DEN", den_contrib);
    let mut den_group: Vec<&str> = vec!["PLT_CN"];
    den_group.extend_from_slice(group_cols_cond);
    let y_plot_den = group_sum(&cond_d, &den_group, &["COND_DEN"]);

    let plots = strat.select(&["PLT_CN", "STRATUM_CN", "EXPNS", "W_H"]);
    let groups = if group_cols_full.is_empty() {
        vec![Vec::<ColumnValue>::new()]
    } else {
        distinct_combinations(&y_plot_num, group_cols_full)
    };

    let cond_idx: Vec<usize> = group_cols_cond
        .iter()
        .map(|c| group_cols_full.iter().position(|g| g == c).expect("group_cols_cond must be subset of group_cols_full"))
        .collect();

    let mut plot_rows: Vec<Frame> = Vec::with_capacity(groups.len());
    for g in &groups {
        let num_sub = if group_cols_full.is_empty() {
            y_plot_num.clone()
        } else {
            filter_to_combination(&y_plot_num, group_cols_full, g)
        };
        let num_filled = left_join_fill(&plots, &num_sub, &["PLT_CN"], &[num_value_col]);

        let cond_values: Vec<ColumnValue> = cond_idx.iter().map(|&i| g[i].clone()).collect();
        let den_sub = if group_cols_cond.is_empty() {
            y_plot_den.clone()
        } else {
            filter_to_combination(&y_plot_den, group_cols_cond, &cond_values)
        };
        let den_filled = left_join_fill(&plots, &den_sub, &["PLT_CN"], &["COND_DEN"]);

        let y_num: Vec<Option<f64>> = num_filled.iter().map(|v| Some(v[0])).collect();
        let y_den: Vec<Option<f64>> = den_filled.iter().map(|v| Some(v[0])).collect();
        let mut frame = append_column(&plots, "Y_NUM", y_num);
        frame = append_column(&frame, "Y_DEN", y_den);
        frame = with_group_columns(&frame, group_cols_full, g);
        plot_rows.push(frame);
    }

    let plot_level = concat_all(&plot_rows);
    let (stratum_level, population) = stage_3_4(&plot_level, strat, group_cols_full);
    let tree_counts = tree_counts_per_group(tree, cond, group_cols_full);

    TwoStageResult {
        plot_level: PlotLevel { frame: plot_level },
        stratum_level: StratumLevel { frame: stratum_level },
        population: Population { frame: population },
        tree_counts,
    }
}

/// Count in-domain tree records per `group_cols_full` combination. Counted
/// straight off the original tree frame rather than the zero-extended
/// plot-level sample, so it reflects how many trees actually fed the
/// estimate rather than how many plots carried a nonzero value.
fn tree_counts_per_group(tree: Option<&Frame>, cond: &Frame, group_cols_full: &[&str]) -> Frame {
    let counted = match tree {
        Some(tree) => {
            let ind: Vec<Option<f64>> = (0..tree.num_rows())
                .map(|r| Some(if tree.get(r, "tDOMAIN_IND").as_f64().unwrap_or(0.0) != 0.0 { 1.0 } else { 0.0 }))
                .collect();
            let tree_ind = append_column(tree, "TREE_COUNT_IND", ind);
            group_sum(&tree_ind, group_cols_full, &["TREE_COUNT_IND"])
        }
        None => {
            let zeros: Vec<Option<f64>> = vec![Some(0.0); cond.num_rows()];
            let cond_z = append_column(cond, "TREE_COUNT_IND", zeros);
            group_sum(&cond_z, group_cols_full, &["TREE_COUNT_IND"])
        }
    };
    rename(&counted, "TREE_COUNT_IND", "N_TREES_F")
}

/// Stage 3 (stratum totals) and Stage 4 (population) from an already
/// zero-extended plot-level frame. Exposed separately so a temporal-method
/// weighting pass (`aggregate::temporal::apply_weights`) can run between
/// Stage 2 and Stage 3 without repeating Stage 1-2's joins.
pub fn stage_3_4(plot_level: &Frame, strat: &Frame, group_cols_full: &[&str]) -> (Frame, Frame) {
    let t_contrib: Vec<Option<f64>> = (0..plot_level.num_rows())
        .map(|r| {
            let y = plot_level.get(r, "Y_NUM").as_f64().unwrap_or(0.0);
            let expns = plot_level.get(r, "EXPNS").as_f64().unwrap_or(0.0);
            Some(y * expns)
        })
        .collect();
    let a_contrib: Vec<Option<f64>> = (0..plot_level.num_rows())
        .map(|r| {
            let y = plot_level.get(r, "Y_DEN").as_f64().unwrap_or(0.0);
            let expns = plot_level.get(r, "EXPNS").as_f64().unwrap_or(0.0);
            Some(y * expns)
        })
        .collect();
    let plot_level_with_contrib = {
        let f = append_column(plot_level, "T_CONTRIB", t_contrib);
        append_column(&f, "A_CONTRIB", a_contrib)
    };

    let mut stratum_group: Vec<&str> = vec!["STRATUM_CN"];
    stratum_group.extend_from_slice(group_cols_full);
    let stratum_level = group_sum(&plot_level_with_contrib, &stratum_group, &["T_CONTRIB", "A_CONTRIB"]);
    let stratum_level = rename(&stratum_level, "T_CONTRIB", "T_HY");
    let stratum_level = rename(&stratum_level, "A_CONTRIB", "A_H");

    let attrs = stratum_attrs(strat);
    let stratum_level = with_stratum_attrs(&stratum_level, &attrs);

    let population = group_sum(&stratum_level, group_cols_full, &["T_HY", "A_H"]);
    let population = rename(&population, "T_HY", "T_Y");
    let population = rename(&population, "A_H", "A");
    let y_hat: Vec<Option<f64>> = (0..population.num_rows())
        .map(|r| {
            let t_y = population.get(r, "T_Y").as_f64().unwrap_or(0.0);
            let a = population.get(r, "A").as_f64().unwrap_or(0.0);
            if a == 0.0 {
                Some(0.0)
            } else {
                Some(t_y / a)
            }
        })
        .collect();
    let population = append_column(&population, "Y_HAT", y_hat);

    (stratum_level, population)
}

struct StratumAttrs {
    expns: f64,
    w_h: f64,
    n_h: usize,
}

fn stratum_attrs(strat: &Frame) -> HashMap<String, StratumAttrs> {
    let mut out: HashMap<String, StratumAttrs> = HashMap::new();
    for r in 0..strat.num_rows() {
        if let Some(cn) = strat.get(r, "STRATUM_CN").as_str() {
            let entry = out.entry(cn.to_string()).or_insert(StratumAttrs {
                expns: strat.get(r, "EXPNS").as_f64().unwrap_or(0.0),
                w_h: strat.get(r, "W_H").as_f64().unwrap_or(0.0),
                n_h: 0,
            });
            entry.n_h += 1;
        }
    }
    out
}

fn with_stratum_attrs(frame: &Frame, attrs: &HashMap<String, StratumAttrs>) -> Frame {
    let expns: Vec<Option<f64>> = (0..frame.num_rows())
        .map(|r| frame.get(r, "STRATUM_CN").as_str().and_then(|cn| attrs.get(cn)).map(|a| a.expns))
        .collect();
    let w_h: Vec<Option<f64>> = (0..frame.num_rows())
        .map(|r| frame.get(r, "STRATUM_CN").as_str().and_then(|cn| attrs.get(cn)).map(|a| a.w_h))
        .collect();
    let n_h: Vec<Option<f64>> = (0..frame.num_rows())
        .map(|r| frame.get(r, "STRATUM_CN").as_str().and_then(|cn| attrs.get(cn)).map(|a| a.n_h as f64))
        .collect();
    let f = append_column(frame, "EXPNS", expns);
    let f = append_column(&f, "W_H", w_h);
    append_column(&f, "N_H", n_h)
}

fn rename(frame: &Frame, from: &str, to: &str) -> Frame {
    let names: Vec<(String, ColumnType)> = frame
        .schema()
        .names()
        .iter()
        .map(|n| {
            let ty = frame.schema().type_of(n).unwrap();
            if n == from {
                (to.to_string(), ty)
            } else {
                (n.clone(), ty)
            }
        })
        .collect();
    let columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    Frame::new(Schema::new(names), columns)
}

/// Broadcast a single distinct group combination's values across every row
/// of `frame`, adding one column per group key.
fn with_group_columns(frame: &Frame, group_cols: &[&str], values: &[ColumnValue]) -> Frame {
    if group_cols.is_empty() {
        return frame.clone();
    }

    let mut names: Vec<(String, ColumnType)> =
        frame.schema().names().iter().map(|n| (n.clone(), frame.schema().type_of(n).unwrap())).collect();
    let mut columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();

    for (col, value) in group_cols.iter().zip(values) {
        let n = frame.num_rows();
        let column = match value {
            ColumnValue::Int(i) => Column::Int(vec![Some(*i); n]),
            ColumnValue::Float(f) => Column::Float(vec![Some(*f); n]),
            ColumnValue::Text(s) => Column::Text(vec![Some(s.clone()); n]),
            ColumnValue::Null => Column::Text(vec![None; n]),
        };
        let ty = match value {
            ColumnValue::Int(_) => ColumnType::Int,
            ColumnValue::Float(_) => ColumnType::Float,
            _ => ColumnType::Text,
        };
        names.push((col.to_string(), ty));
        columns.push(column);
    }

    Frame::new(Schema::new(names), columns)
}

fn concat_all(frames: &[Frame]) -> Frame {
    let mut iter = frames.iter();
    let first = iter.next().expect("concat_all: at least one group").clone();
    iter.fold(first, |acc, f| acc.concat(f))
}
