//! Stratified variance estimation (spec.md §4.7). Variance is always taken
//! on the zero-extended per-plot sample produced by `aggregate::two_stage` —
//! computing it on domain-matching rows alone would understate `n_h` and
//! inflate the standard error.

use std::collections::HashMap;

use rayon::prelude::*;
use statrs::statistics::Data;
use statrs::statistics::Statistics;

use crate::aggregate::util::{distinct_combinations, filter_to_combination};
use crate::db::value::ColumnValue;
use crate::error::VarianceError;
use crate::frame::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceMethod {
    /// Plain stratified variance of the population total.
    Standard,
    /// Ratio-of-means variance of the per-acre estimate (numerator and
    /// denominator covariance included).
    Ratio,
    /// `Ratio` when a per-acre column is requested, `Standard` otherwise —
    /// an estimator call can emit both `_ACRE` and `_TOTAL` columns from one
    /// stratum pass.
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct VarianceResult {
    pub group: Vec<ColumnValue>,
    pub total: f64,
    pub total_variance: f64,
    pub total_se: f64,
    pub total_se_percent: f64,
    pub acre: f64,
    pub acre_variance: Option<f64>,
    pub acre_se: Option<f64>,
    pub acre_se_percent: Option<f64>,
    pub n_plots: usize,
}

/// `plot_level` must be the zero-extended frame produced by
/// `aggregate::two_stage::aggregate` (or `stage_3_4`'s input): one row per
/// (plot, group) with `PLT_CN`, `STRATUM_CN`, `Y_NUM`, `Y_DEN`, `EXPNS`,
/// `W_H`.
pub fn estimate_variance(
    plot_level: &Frame,
    group_cols: &[&str],
    method: VarianceMethod,
) -> Result<Vec<VarianceResult>, VarianceError> {
    let groups: Vec<Vec<ColumnValue>> =
        if group_cols.is_empty() { vec![Vec::new()] } else { distinct_combinations(plot_level, group_cols) };

    // Each group's stratified variance is independent of every other
    // group's, so for group-heavy calls (many species/ownership/state
    // combinations) this is an embarrassingly parallel reduction.
    groups
        .into_par_iter()
        .map(|g| {
            let sub =
                if group_cols.is_empty() { plot_level.clone() } else { filter_to_combination(plot_level, group_cols, &g) };
            variance_for_group(&sub, g, method)
        })
        .collect()
}

struct StratumSample {
    w_h: f64,
    t_vals: Vec<f64>,
    a_vals: Vec<f64>,
}

fn variance_for_group(sub: &Frame, group: Vec<ColumnValue>, method: VarianceMethod) -> Result<VarianceResult, VarianceError> {
    let mut by_stratum: HashMap<String, StratumSample> = HashMap::new();

    for r in 0..sub.num_rows() {
        let stratum_cn = sub
            .get(r, "STRATUM_CN")
            .as_str()
            .ok_or_else(|| VarianceError::MissingPlotCondition { plt_cn: sub.get(r, "PLT_CN").to_string() })?
            .to_string();
        let expns = sub.get(r, "EXPNS").as_f64().unwrap_or(0.0);
        let w_h = sub.get(r, "W_H").as_f64().unwrap_or(0.0);
        let y_num = sub.get(r, "Y_NUM").as_f64().unwrap_or(0.0);
        let y_den = sub.get(r, "Y_DEN").as_f64().unwrap_or(0.0);

        let entry = by_stratum.entry(stratum_cn).or_insert(StratumSample { w_h, t_vals: Vec::new(), a_vals: Vec::new() });
        entry.t_vals.push(y_num * expns);
        entry.a_vals.push(y_den * expns);
    }

    let mut var_t = 0.0;
    let mut var_a = 0.0;
    let mut cov_ta = 0.0;
    let mut total_y = 0.0;
    let mut total_a = 0.0;
    let mut n_plots = 0;

    for sample in by_stratum.values() {
        let n_h = sample.t_vals.len();
        n_plots += n_h;
        total_y += sample.t_vals.iter().sum::<f64>();
        total_a += sample.a_vals.iter().sum::<f64>();

        if n_h <= 1 {
            continue;
        }
        let s2_t = sample_variance(&sample.t_vals);
        let s2_a = sample_variance(&sample.a_vals);
        let s_ta = sample_covariance(&sample.t_vals, &sample.a_vals);
        let w2n = sample.w_h * sample.w_h * n_h as f64;
        var_t += w2n * s2_t;
        var_a += w2n * s2_a;
        cov_ta += w2n * s_ta;
    }

    let acre = if total_a == 0.0 { 0.0 } else { total_y / total_a };

    let ratio_variance = if total_a == 0.0 {
        0.0
    } else {
        (var_t + acre * acre * var_a - 2.0 * acre * cov_ta) / (total_a * total_a)
    };

    let want_acre = matches!(method, VarianceMethod::Ratio | VarianceMethod::Hybrid);

    let total_se = var_t.max(0.0).sqrt();
    let total_se_percent = if total_y == 0.0 { 0.0 } else { 100.0 * total_se / total_y.abs() };

    let (acre_variance, acre_se, acre_se_percent) = if want_acre {
        let v = ratio_variance.max(0.0);
        let se = v.sqrt();
        let se_pct = if acre == 0.0 { 0.0 } else { 100.0 * se / acre.abs() };
        (Some(v), Some(se), Some(se_pct))
    } else {
        (None, None, None)
    };

    Ok(VarianceResult {
        group,
        total: total_y,
        total_variance: var_t,
        total_se,
        total_se_percent,
        acre,
        acre_variance,
        acre_se,
        acre_se_percent,
        n_plots,
    })
}

fn sample_variance(values: &[f64]) -> f64 {
    if values.len() <= 1 {
        return 0.0;
    }
    Data::new(values.to_vec()).variance()
}

fn sample_covariance(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len();
    if n <= 1 || n != b.len() {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f64>() / n as f64;
    let mean_b = b.iter().sum::<f64>() / n as f64;
    let ss: f64 = a.iter().zip(b).map(|(x, y)| (x - mean_a) * (y - mean_b)).sum();
    ss / (n as f64 - 1.0)
}
