//! GRM (growth/removal/mortality) component routing, shared by
//! `estimators::growth`, `estimators::mortality`, and
//! `estimators::removals` (spec.md §4.8 "Component routing for GRM").
//!
//! Each GRM-component tree record carries one of eleven component codes;
//! which bucket it belongs to (growth, mortality, or removal) and which
//! measurement column it contributes determines the per-tree annualized
//! value fed into [`crate::aggregate::two_stage::aggregate_grm`]. Records
//! with `SUBPTYP_GRM == 0` still flow through this function (never
//! filtered out here) — they're zeroed by `grm_adj_factor` downstream, not
//! by dropping the row.

use crate::frame::frame::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrmComponent {
    Survivor,
    Ingrowth,
    Reversion1,
    Reversion2,
    Mortality1,
    Mortality2,
    Cut1,
    Cut2,
    Cut3,
    Diversion1,
    Diversion2,
    Other,
}

impl GrmComponent {
    pub fn parse(code: &str) -> GrmComponent {
        match code {
            "SURVIVOR" => GrmComponent::Survivor,
            "INGROWTH" => GrmComponent::Ingrowth,
            "REVERSION1" => GrmComponent::Reversion1,
            "REVERSION2" => GrmComponent::Reversion2,
            "MORTALITY1" => GrmComponent::Mortality1,
            "MORTALITY2" => GrmComponent::Mortality2,
            "CUT1" => GrmComponent::Cut1,
            "CUT2" => GrmComponent::Cut2,
            "CUT3" => GrmComponent::Cut3,
            "DIVERSION1" => GrmComponent::Diversion1,
            "DIVERSION2" => GrmComponent::Diversion2,
            _ => GrmComponent::Other,
        }
    }

    pub fn is_growth(self) -> bool {
        matches!(self, GrmComponent::Survivor | GrmComponent::Ingrowth | GrmComponent::Reversion1 | GrmComponent::Reversion2)
    }

    pub fn is_mortality(self) -> bool {
        matches!(self, GrmComponent::Mortality1 | GrmComponent::Mortality2)
    }

    pub fn is_removal(self) -> bool {
        matches!(
            self,
            GrmComponent::Cut1 | GrmComponent::Cut2 | GrmComponent::Cut3 | GrmComponent::Diversion1 | GrmComponent::Diversion2
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrmMeasure {
    Volume,
    Biomass,
    Count,
    BasalArea,
}

/// Which of the three GRM component groups an estimator call is reading —
/// selected by the caller (`estimators::growth`/`mortality`/`removals`), not
/// inferred from whatever component happens to be on the row. A row outside
/// the requested bucket contributes nothing, the way the original query
/// filters on its own rate column being positive (`query_builder.py`'s
/// `AND t.{rate_col} > 0`) rather than summing every bucket at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrmBucket {
    Growth,
    Mortality,
    Removal,
}

/// The annualized per-tree GRM contribution, before the `SUBPTYP_GRM`
/// adjustment factor and domain indicator are applied by the shared
/// two-stage aggregator. Rows whose component doesn't belong to `bucket`
/// contribute zero, so a mixed-component `TREE_GRM_COMPONENT` table can be
/// passed to all three estimators without cross-contaminating their totals.
///
/// SURVIVOR is the midpoint-minus-begin delta: the tree was present at
/// both ends of the remeasurement period, so its growth is the change in
/// its own measurement. INGROWTH and REVERSION{1,2} use the end (midpoint)
/// value alone — the tree was absent, or out of domain, at period start.
/// Mortality and removal components always use the midpoint value, the
/// best estimate of what the tree held at the time it died or was cut.
pub fn component_value(frame: &Frame, row: usize, measure: GrmMeasure, bucket: GrmBucket) -> f64 {
    let component = GrmComponent::parse(frame.get(row, "COMPONENT").as_str().unwrap_or(""));

    let in_bucket = match bucket {
        GrmBucket::Growth => component.is_growth(),
        GrmBucket::Mortality => component.is_mortality(),
        GrmBucket::Removal => component.is_removal(),
    };
    if !in_bucket {
        return 0.0;
    }

    let remper = frame.get(row, "REMPER").as_f64().unwrap_or(1.0).max(f64::EPSILON);
    let rate = match bucket {
        GrmBucket::Growth => frame.get(row, "TPAGROW_UNADJ").as_f64().unwrap_or(0.0),
        GrmBucket::Mortality => frame.get(row, "TPAMORT_UNADJ").as_f64().unwrap_or(0.0),
        GrmBucket::Removal => frame.get(row, "TPAREMV_UNADJ").as_f64().unwrap_or(0.0),
    };

    let magnitude = if component == GrmComponent::Survivor {
        measure_column(frame, row, measure, "MIDPT") - measure_column(frame, row, measure, "BEGIN")
    } else {
        measure_column(frame, row, measure, "MIDPT")
    };

    magnitude * rate / remper
}

fn measure_column(frame: &Frame, row: usize, measure: GrmMeasure, point: &str) -> f64 {
    match measure {
        GrmMeasure::Count => 1.0,
        GrmMeasure::Volume => frame.get(row, &format!("VOLCFNET_{point}")).as_f64().unwrap_or(0.0),
        GrmMeasure::Biomass => frame.get(row, &format!("DRYBIO_AG_{point}")).as_f64().unwrap_or(0.0) / 2000.0,
        GrmMeasure::BasalArea => {
            let dia = frame.get(row, &format!("DIA_{point}")).as_f64().unwrap_or(0.0);
            std::f64::consts::PI * (dia / 24.0).powi(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::value::ColumnType;
    use crate::frame::frame::{Column, Schema};

    fn frame_for(component: &str) -> Frame {
        let schema = Schema::new(vec![
            ("COMPONENT".into(), ColumnType::Text),
            ("REMPER".into(), ColumnType::Float),
            ("TPAGROW_UNADJ".into(), ColumnType::Float),
            ("TPAMORT_UNADJ".into(), ColumnType::Float),
            ("TPAREMV_UNADJ".into(), ColumnType::Float),
            ("VOLCFNET_MIDPT".into(), ColumnType::Float),
            ("VOLCFNET_BEGIN".into(), ColumnType::Float),
        ]);
        Frame::new(
            schema,
            vec![
                Column::Text(vec![Some(component.to_string())]),
                Column::Float(vec![Some(5.0)]),
                Column::Float(vec![Some(2.0)]),
                Column::Float(vec![Some(2.0)]),
                Column::Float(vec![Some(2.0)]),
                Column::Float(vec![Some(20.0)]),
                Column::Float(vec![Some(12.0)]),
            ],
        )
    }

    #[test]
    fn survivor_uses_midpoint_minus_begin_delta() {
        let value = component_value(&frame_for("SURVIVOR"), 0, GrmMeasure::Volume, GrmBucket::Growth);
        // (20 - 12) * 2 / 5 = 3.2
        assert!((value - 3.2).abs() < 1e-9);
    }

    #[test]
    fn ingrowth_uses_end_value_alone() {
        let value = component_value(&frame_for("INGROWTH"), 0, GrmMeasure::Volume, GrmBucket::Growth);
        // 20 * 2 / 5 = 8.0
        assert!((value - 8.0).abs() < 1e-9);
    }

    #[test]
    fn unrelated_component_contributes_zero() {
        let value = component_value(&frame_for("OTHER"), 0, GrmMeasure::Volume, GrmBucket::Growth);
        assert_eq!(value, 0.0);
    }

    #[test]
    fn mortality_bucket_ignores_a_growth_component_row() {
        let value = component_value(&frame_for("SURVIVOR"), 0, GrmMeasure::Volume, GrmBucket::Mortality);
        assert_eq!(value, 0.0);
    }
}
