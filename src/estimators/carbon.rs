//! Carbon estimator (spec.md §4.8 "carbon" row): biomass scaled by a
//! carbon fraction (default 0.47, the standard IPCC/FIA hardwood-softwood
//! blended constant).

use crate::aggregate::temporal::TemporalMethod;
use crate::aggregate::two_stage::aggregate;
use crate::aggregate::variance::VarianceMethod;
use crate::config::EstimatorConfig;
use crate::error::{ConfigError, FiaError};
use crate::estimators::biomass::{biomass_tons, BiomassComponent};
use crate::estimators::common::{append_float_column, finish, resolve_group_columns, split_group_cols, with_derived_group_columns};
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

pub const DEFAULT_CARBON_FRACTION: f64 = 0.47;

#[derive(Debug, Clone)]
pub struct CarbonConfig {
    pub base: EstimatorConfig,
    pub component: BiomassComponent,
    pub carbon_fraction: f64,
}

impl Default for CarbonConfig {
    fn default() -> Self {
        Self { base: EstimatorConfig::default(), component: BiomassComponent::Total, carbon_fraction: DEFAULT_CARBON_FRACTION }
    }
}

impl CarbonConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported("carbon", &[TemporalMethod::Ti, TemporalMethod::Annual])
    }
}

pub fn carbon(session: &Session, config: &CarbonConfig) -> Result<Outcome<Table>, FiaError> {
    config.validate()?;

    let mut warnings = Vec::new();
    if config.base.most_recent {
        let out = session.clip_most_recent("EXPVOL")?;
        warnings.extend(out.warnings);
    }

    let frames = session.load_estimation_frames(
        config.base.land_type(),
        config.base.tree_type(),
        true,
        config.base.tree_domain.as_deref(),
        config.base.area_domain.as_deref(),
        config.base.plot_domain.as_deref(),
    )?;
    let tree = frames.tree.expect("carbon always requests the tree frame");

    let ref_species = session.ref_species();
    let (tree, derived) = with_derived_group_columns(&tree, &config.base, ref_species.as_ref());

    let values: Vec<Option<f64>> = (0..tree.num_rows())
        .map(|r| Some(biomass_tons(&tree, r, config.component, false) * config.carbon_fraction))
        .collect();
    let tree = append_float_column(&tree, "CARB_VALUE", values);

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &derived, Some(&tree), &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let result = aggregate(Some(&tree), &frames.cond, &frames.strat, "CARB_VALUE", &group_full, &group_cond);

    let names = ColumnNames { acre: "CARB_ACRE", total: "CARB_TOTAL" };
    let table = finish(&result, &group_full, VarianceMethod::Hybrid, names, &config.base)?;
    Ok(Outcome::with_warnings(table, warnings))
}
