//! Shared plumbing every estimator in this module uses: attaching derived
//! grouping columns, splitting a grouping key into its tree-level and
//! condition-level parts (spec.md §4.6 "Grouping"), and assembling the
//! final per-group result row from a two-stage aggregation plus its
//! variance pass.

use crate::aggregate::two_stage::TwoStageResult;
use crate::aggregate::variance::{estimate_variance, VarianceMethod};
use crate::config::EstimatorConfig;
use crate::db::value::{ColumnType, ColumnValue};
use crate::domain::classify::{assign_size_class, assign_species_group, SizeClassScheme, SpeciesGroupLevel};
use crate::error::FiaError;
use crate::frame::frame::{Column, Frame, Schema};
use crate::outcome::Warning;
use crate::output::formatter::{build_table, ColumnNames, Table};

pub fn append_float_column(frame: &Frame, name: &str, values: Vec<Option<f64>>) -> Frame {
    append_column(frame, name, ColumnType::Float, Column::Float(values))
}

pub fn append_int_column(frame: &Frame, name: &str, values: Vec<Option<i64>>) -> Frame {
    append_column(frame, name, ColumnType::Int, Column::Int(values))
}

pub fn append_text_column(frame: &Frame, name: &str, values: Vec<Option<String>>) -> Frame {
    append_column(frame, name, ColumnType::Text, Column::Text(values))
}

fn append_column(frame: &Frame, name: &str, ty: ColumnType, column: Column) -> Frame {
    let mut names: Vec<(String, ColumnType)> =
        frame.schema().names().iter().map(|n| (n.clone(), frame.schema().type_of(n).unwrap())).collect();
    names.push((name.to_string(), ty));
    let mut columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    columns.push(column);
    Frame::new(Schema::new(names), columns)
}

/// Attach `SPGRPCD` (from `ref_species`, when supplied) and/or `SIZE_CLASS`
/// to `tree` when the config asks for them, returning the updated frame and
/// the resulting tree-level grouping column names in the order they were
/// added.
pub fn with_derived_group_columns(tree: &Frame, config: &EstimatorConfig, ref_species: Option<&Frame>) -> (Frame, Vec<String>) {
    let mut frame = tree.clone();
    let mut added = Vec::new();

    if config.by_species {
        if let Some(refs) = ref_species {
            let values: Vec<Option<i64>> = (0..frame.num_rows())
                .map(|r| {
                    let spcd = frame.get(r, "SPCD").as_i64()?;
                    assign_species_group(refs, spcd, SpeciesGroupLevel::MajorSpeciesGroup)
                        .and_then(|v| v.parse::<i64>().ok())
                })
                .collect();
            frame = append_int_column(&frame, "SPGRPCD", values);
            added.push("SPGRPCD".to_string());
        } else {
            let values: Vec<Option<i64>> = (0..frame.num_rows()).map(|r| frame.get(r, "SPCD").as_i64()).collect();
            frame = append_int_column(&frame, "SPGRPCD", values);
            added.push("SPGRPCD".to_string());
        }
    }

    if config.by_size_class {
        let values: Vec<Option<String>> = (0..frame.num_rows())
            .map(|r| {
                let dia = frame.get(r, "DIA").as_f64().unwrap_or(0.0);
                Some(assign_size_class(dia, SizeClassScheme::Standard).to_string())
            })
            .collect();
        frame = append_text_column(&frame, "SIZE_CLASS", values);
        added.push("SIZE_CLASS".to_string());
    }

    (frame, added)
}

/// Resolve the full list of requested grouping columns (user `grp_by` plus
/// any derived columns) against what is actually present on `tree`/`cond`.
/// A requested column absent from both is dropped from the active grouping
/// set and surfaced as `Warning::UnknownGroupColumn` rather than failing the
/// whole call (spec.md §7's named exception).
pub fn resolve_group_columns(
    requested: &[String],
    derived: &[String],
    tree: Option<&Frame>,
    cond: &Frame,
) -> (Vec<String>, Vec<Warning>) {
    let mut resolved = Vec::new();
    let mut warnings = Vec::new();
    for name in requested.iter().chain(derived.iter()) {
        let present = cond.schema().contains(name) || tree.map(|t| t.schema().contains(name)).unwrap_or(false);
        if present {
            if !resolved.contains(name) {
                resolved.push(name.clone());
            }
        } else {
            warnings.push(Warning::UnknownGroupColumn { column: name.clone() });
        }
    }
    (resolved, warnings)
}

/// Split a resolved grouping key into the subset also present on `cond`
/// (used for the per-acre denominator, spec.md §4.6) versus the full set
/// (used for the numerator).
pub fn split_group_cols<'a>(resolved: &'a [String], cond: &Frame) -> (Vec<&'a str>, Vec<&'a str>) {
    let full: Vec<&str> = resolved.iter().map(|s| s.as_str()).collect();
    let cond_subset: Vec<&str> = resolved.iter().filter(|s| cond.schema().contains(s)).map(|s| s.as_str()).collect();
    (full, cond_subset)
}

/// Locate the population-row matching a `VarianceResult`'s group key inside
/// `population` (the `aggregate::two_stage::stage_3_4` output), returning
/// its row index. Both frames are built from the same distinct-combination
/// order, but this is a defensive lookup rather than assuming index parity.
pub fn population_row_for(population: &Frame, group_cols: &[&str], key: &[ColumnValue]) -> usize {
    if group_cols.is_empty() {
        return 0;
    }
    for r in 0..population.num_rows() {
        if group_cols.iter().zip(key).all(|(&c, v)| &population.get(r, c) == v) {
            return r;
        }
    }
    panic!("population_row_for: no row matches group key");
}

/// Run the variance pass over a two-stage result's plot-level frame and
/// assemble the final output table — the shared tail end of every
/// estimator (spec.md §4.7 into §4.9). When `config.by_plot` is set the
/// population aggregation (Stage 3-4) is skipped entirely and the caller
/// gets back one row per plot instead of per group, matching the source
/// library's `by_plot=True` escape hatch for inspecting plot-level values
/// directly.
pub fn finish(
    result: &TwoStageResult,
    group_cols_full: &[&str],
    variance_method: VarianceMethod,
    names: ColumnNames,
    config: &EstimatorConfig,
) -> Result<Table, FiaError> {
    if config.by_plot {
        return Ok(plot_level_table(&result.plot_level.frame, group_cols_full, names));
    }
    let variances = estimate_variance(&result.plot_level.frame, group_cols_full, variance_method)?;
    Ok(build_table(&result.population.frame, &variances, group_cols_full, names, config, &result.tree_counts))
}

pub fn plot_level_table(plot_level: &Frame, group_cols_full: &[&str], names: ColumnNames) -> Table {
    let mut schema_cols = vec![("PLT_CN".to_string(), ColumnType::Text)];
    schema_cols.extend(group_cols_full.iter().map(|&c| (c.to_string(), plot_level.schema().type_of(c).unwrap())));
    schema_cols.push((names.acre.to_string(), ColumnType::Float));

    let mut columns: Vec<Column> = vec![plot_level.column("PLT_CN").unwrap().clone()];
    columns.extend(group_cols_full.iter().map(|&c| plot_level.column(c).unwrap().clone()));

    let ratio: Vec<Option<f64>> = (0..plot_level.num_rows())
        .map(|r| {
            let num = plot_level.get(r, "Y_NUM").as_f64().unwrap_or(0.0);
            let den = plot_level.get(r, "Y_DEN").as_f64().unwrap_or(0.0);
            Some(if den == 0.0 { 0.0 } else { num / den })
        })
        .collect();
    columns.push(Column::Float(ratio));

    Frame::new(Schema::new(schema_cols), columns)
}
