//! Temporal method dispatch (spec.md §4.6 "Temporal methods"). Every method
//! reuses the same two-stage arithmetic in `aggregate::two_stage`; only the
//! plot-level weighting applied before Stage 3 changes.

use std::collections::HashMap;

use crate::db::value::ColumnType;
use crate::error::ConfigError;
use crate::frame::frame::{Column, Frame, Schema};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TemporalMethod {
    /// Temporally indifferent (default): every plot in the active
    /// evaluation contributes with weight 1.
    Ti,
    /// Restrict to plots measured in a single inventory year.
    Annual,
    /// Simple moving average across panels within the evaluation.
    Sma,
    /// Linear moving average across panels (weights increase linearly with
    /// recency).
    Lma,
    /// Exponential moving average with smoothing parameter `lambda`.
    Ema { lambda: f64 },
}

impl TemporalMethod {
    pub fn name(&self) -> &'static str {
        match self {
            TemporalMethod::Ti => "TI",
            TemporalMethod::Annual => "ANNUAL",
            TemporalMethod::Sma => "SMA",
            TemporalMethod::Lma => "LMA",
            TemporalMethod::Ema { .. } => "EMA",
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let TemporalMethod::Ema { lambda } = self {
            if !(0.0..=1.0).contains(lambda) {
                return Err(ConfigError::LambdaOutOfRange(*lambda));
            }
        }
        Ok(())
    }

    /// Raises `ConfigError::UnsupportedTemporalMethod` unless this method is
    /// one the calling estimator has opted into — methods are gated per
    /// estimator rather than accepted universally and silently downgraded to
    /// TI.
    pub fn require_supported(&self, estimator: &str, supported: &[TemporalMethod]) -> Result<(), ConfigError> {
        self.validate()?;
        let supported_names = |m: &TemporalMethod| m.name();
        if supported.iter().any(|m| supported_names(m) == self.name()) {
            Ok(())
        } else {
            Err(ConfigError::UnsupportedTemporalMethod { method: self.name().to_string(), estimator: estimator.to_string() })
        }
    }
}

/// Per-plot weight multiplier applied to `Y_NUM`/`Y_DEN` before Stage 3.
/// `plot_level` must carry `PLT_CN` and `INVYR`; for `Sma`/`Lma`/`Ema` it
/// must also carry `PANEL` (the measurement panel number within the cycle).
pub fn plot_weights(plot_level: &Frame, method: TemporalMethod, target_invyr: Option<i64>) -> Vec<f64> {
    match method {
        TemporalMethod::Ti => vec![1.0; plot_level.num_rows()],
        TemporalMethod::Annual => (0..plot_level.num_rows())
            .map(|r| {
                let invyr = plot_level.get(r, "INVYR").as_i64();
                if invyr == target_invyr {
                    1.0
                } else {
                    0.0
                }
            })
            .collect(),
        TemporalMethod::Sma => {
            let panels = distinct_panel_count(plot_level);
            let w = if panels == 0 { 1.0 } else { 1.0 / panels as f64 };
            vec![w; plot_level.num_rows()]
        }
        TemporalMethod::Lma => {
            let panels = panel_order(plot_level);
            let n = panels.len().max(1) as f64;
            let rank_weight: HashMap<i64, f64> =
                panels.iter().enumerate().map(|(i, &p)| (p, (i as f64 + 1.0) / (n * (n + 1.0) / 2.0))).collect();
            (0..plot_level.num_rows())
                .map(|r| plot_level.get(r, "PANEL").as_i64().and_then(|p| rank_weight.get(&p).copied()).unwrap_or(0.0))
                .collect()
        }
        TemporalMethod::Ema { lambda } => {
            let panels = panel_order(plot_level);
            let n = panels.len();
            let mut raw: HashMap<i64, f64> = HashMap::new();
            for (i, &p) in panels.iter().enumerate() {
                let age = (n - 1 - i) as i32;
                raw.insert(p, lambda * (1.0 - lambda).powi(age));
            }
            let total: f64 = raw.values().sum();
            let normalized: HashMap<i64, f64> =
                if total > 0.0 { raw.into_iter().map(|(p, w)| (p, w / total)).collect() } else { raw };
            (0..plot_level.num_rows())
                .map(|r| plot_level.get(r, "PANEL").as_i64().and_then(|p| normalized.get(&p).copied()).unwrap_or(0.0))
                .collect()
        }
    }
}

/// Scale `Y_NUM`/`Y_DEN` on `plot_level` in place by `weights` (one per
/// row), for use between Stage 2 and Stage 3 when `method != Ti`.
pub fn apply_weights(plot_level: &Frame, weights: &[f64]) -> Frame {
    let y_num: Vec<Option<f64>> = (0..plot_level.num_rows())
        .map(|r| Some(plot_level.get(r, "Y_NUM").as_f64().unwrap_or(0.0) * weights[r]))
        .collect();
    let y_den: Vec<Option<f64>> = (0..plot_level.num_rows())
        .map(|r| Some(plot_level.get(r, "Y_DEN").as_f64().unwrap_or(0.0) * weights[r]))
        .collect();

    let names: Vec<(String, ColumnType)> = plot_level
        .schema()
        .names()
        .iter()
        .map(|n| (n.clone(), plot_level.schema().type_of(n).unwrap()))
        .collect();
    let mut columns: Vec<Column> = (0..plot_level.schema().len()).map(|i| plot_level.column_at(i).clone()).collect();
    for (i, name) in plot_level.schema().names().iter().enumerate() {
        if name == "Y_NUM" {
            columns[i] = Column::Float(y_num.clone());
        } else if name == "Y_DEN" {
            columns[i] = Column::Float(y_den.clone());
        }
    }
    Frame::new(Schema::new(names), columns)
}

fn distinct_panel_count(frame: &Frame) -> usize {
    panel_order(frame).len()
}

/// Distinct panel numbers present, oldest first.
fn panel_order(frame: &Frame) -> Vec<i64> {
    let mut seen: Vec<i64> = Vec::new();
    for r in 0..frame.num_rows() {
        if let Some(p) = frame.get(r, "PANEL").as_i64() {
            if !seen.contains(&p) {
                seen.push(p);
            }
        }
    }
    seen.sort_unstable();
    seen
}
