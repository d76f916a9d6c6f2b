//! Removals estimator (spec.md §4.8 "removals" row): annualized harvest
//! and land-use-diversion removals, from the GRM component table's
//! CUT{1,2,3}/DIVERSION{1,2} records.

use crate::aggregate::two_stage::aggregate_grm;
use crate::config::EstimatorConfig;
use crate::domain::filter::LandType;
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{append_float_column, finish, resolve_group_columns, split_group_cols};
use crate::estimators::grm::{component_value, GrmBucket, GrmMeasure};
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalsMeasure {
    Volume,
    Biomass,
    Count,
}

impl Default for RemovalsMeasure {
    fn default() -> Self {
        RemovalsMeasure::Volume
    }
}

impl From<RemovalsMeasure> for GrmMeasure {
    fn from(m: RemovalsMeasure) -> Self {
        match m {
            RemovalsMeasure::Volume => GrmMeasure::Volume,
            RemovalsMeasure::Biomass => GrmMeasure::Biomass,
            RemovalsMeasure::Count => GrmMeasure::Count,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RemovalsConfig {
    pub base: EstimatorConfig,
    pub measure: RemovalsMeasure,
}

impl RemovalsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported("removals", &[crate::aggregate::temporal::TemporalMethod::Ti])
    }
}

pub fn removals(session: &Session, config: &RemovalsConfig) -> Result<Outcome<Table>, FiaError> {
    config.validate()?;

    let mut warnings = Vec::new();
    if config.base.most_recent {
        let out = session.clip_most_recent("EXPREMV")?;
        warnings.extend(out.warnings);
    }

    let land_type = if matches!(config.base.land_type(), LandType::All) { LandType::Forest } else { config.base.land_type() };
    let frames = session.load_grm_frames(land_type, config.base.tree_domain.as_deref(), config.base.area_domain.as_deref(), config.base.plot_domain.as_deref())?;
    let tree = frames.tree.expect("load_grm_frames always populates the tree frame");

    let measure: GrmMeasure = config.measure.into();
    let values: Vec<Option<f64>> =
        (0..tree.num_rows()).map(|r| Some(component_value(&tree, r, measure, GrmBucket::Removal))).collect();
    let tree = append_float_column(&tree, "GRM_VALUE", values);

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &[], Some(&tree), &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let result = aggregate_grm(&tree, &frames.cond, &frames.strat, "GRM_VALUE", "SUBPTYP_GRM", &group_full, &group_cond);

    let names = ColumnNames { acre: "REMV_ACRE", total: "REMV_TOTAL" };
    let table = finish(&result, &group_full, config.base.variance_method(), names, &config.base)?;
    Ok(Outcome::with_warnings(table, warnings))
}
