//! Biomass estimator (spec.md §4.8 "biomass" row): above-ground, below-ground,
//! or total dry biomass per acre in tons, from `TREE.DRYBIO_AG/DRYBIO_BG`.

use crate::aggregate::temporal::TemporalMethod;
use crate::aggregate::two_stage::aggregate;
use crate::aggregate::variance::VarianceMethod;
use crate::config::EstimatorConfig;
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{append_float_column, finish, resolve_group_columns, split_group_cols, with_derived_group_columns};
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiomassComponent {
    Ag,
    Bg,
    Total,
}

impl Default for BiomassComponent {
    fn default() -> Self {
        BiomassComponent::Ag
    }
}

#[derive(Debug, Clone, Default)]
pub struct BiomassConfig {
    pub base: EstimatorConfig,
    pub component: BiomassComponent,
    pub include_foliage: bool,
}

impl BiomassConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported("biomass", &[TemporalMethod::Ti, TemporalMethod::Annual])
    }
}

/// Tons of dry biomass per tree (`DRYBIO_*` is pounds): the shared 2000
/// lb/ton conversion every biomass-derived estimator (biomass, carbon,
/// carbon_flux) applies once, here, rather than duplicating it downstream.
pub fn biomass_tons(tree: &crate::frame::frame::Frame, row: usize, component: BiomassComponent, include_foliage: bool) -> f64 {
    let ag = tree.get(row, "DRYBIO_AG").as_f64().unwrap_or(0.0);
    let bg = tree.get(row, "DRYBIO_BG").as_f64().unwrap_or(0.0);
    let foliage = if include_foliage { tree.get(row, "DRYBIO_FOLIAGE").as_f64().unwrap_or(0.0) } else { 0.0 };
    let pounds = match component {
        BiomassComponent::Ag => ag + foliage,
        BiomassComponent::Bg => bg,
        BiomassComponent::Total => ag + bg + foliage,
    };
    pounds / 2000.0
}

pub fn biomass(session: &Session, config: &BiomassConfig) -> Result<Outcome<Table>, FiaError> {
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
    let tree = frames.tree.expect("biomass always requests the tree frame");

    let ref_species = session.ref_species();
    let (tree, derived) = with_derived_group_columns(&tree, &config.base, ref_species.as_ref());

    let values: Vec<Option<f64>> =
        (0..tree.num_rows()).map(|r| Some(biomass_tons(&tree, r, config.component, config.include_foliage))).collect();
    let tree = append_float_column(&tree, "BIO_VALUE", values);

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &derived, Some(&tree), &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let result = aggregate(Some(&tree), &frames.cond, &frames.strat, "BIO_VALUE", &group_full, &group_cond);

    let names = ColumnNames { acre: "BIO_ACRE", total: "BIO_TOTAL" };
    let table = finish(&result, &group_full, VarianceMethod::Hybrid, names, &config.base)?;
    Ok(Outcome::with_warnings(table, warnings))
}
