//! Mortality estimator (spec.md §4.8 "mortality" row, and §8's "dead-tree
//! TPA vs live-tree TPA" Open Question): annualized mortality of trees from
//! the GRM component table's MORTALITY{1,2} records.

use crate::config::EstimatorConfig;
use crate::domain::filter::{LandType, TreeType};
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{append_float_column, finish, resolve_group_columns, split_group_cols};
use crate::estimators::grm::{component_value, GrmBucket, GrmMeasure};
use crate::aggregate::two_stage::aggregate_grm;
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MortalityType {
    Tpa,
    Volume,
    Biomass,
    BasalArea,
    Both,
}

impl Default for MortalityType {
    fn default() -> Self {
        MortalityType::Tpa
    }
}

#[derive(Debug, Clone, Default)]
pub struct MortalityConfig {
    pub base: EstimatorConfig,
    pub mortality_type: MortalityType,
}

impl MortalityConfig {
    /// The source's preserved behavior (spec.md § Open Questions, "Dead-tree
    /// TPA vs live-tree TPA"): `mortality_type in {tpa, volume}` combined
    /// with `tree_type=live` is a hard configuration error rather than a
    /// silently empty result, since a dead-tree measure computed against a
    /// live-tree domain is never meaningful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported("mortality", &[crate::aggregate::temporal::TemporalMethod::Ti])?;

        let incompatible = matches!(self.base.tree_type(), TreeType::Live | TreeType::AllLive)
            && matches!(self.mortality_type, MortalityType::Tpa | MortalityType::Volume);
        if incompatible {
            return Err(ConfigError::IncompatibleTreeType {
                tree_type: format!("{:?}", self.base.tree_type()),
                context: "mortality_type=tpa|volume".to_string(),
            });
        }
        Ok(())
    }
}

pub fn mortality(session: &Session, config: &MortalityConfig) -> Result<Outcome<Table>, FiaError> {
    config.validate()?;

    let mut warnings = Vec::new();
    if config.base.most_recent {
        let out = session.clip_most_recent("EXPMORT")?;
        warnings.extend(out.warnings);
    }

    let land_type = if matches!(config.base.land_type(), LandType::All) { LandType::Forest } else { config.base.land_type() };
    let frames = session.load_grm_frames(land_type, config.base.tree_domain.as_deref(), config.base.area_domain.as_deref(), config.base.plot_domain.as_deref())?;
    let tree = frames.tree.expect("load_grm_frames always populates the tree frame");

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &[], Some(&tree), &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let table = match config.mortality_type {
        MortalityType::Both => {
            let tpa_table = run_single(&tree, &frames, &group_full, &group_cond, GrmMeasure::Count, ColumnNames { acre: "MORT_TPA_ACRE", total: "MORT_TPA_TOTAL" }, &config.base)?;
            let vol_table = run_single(&tree, &frames, &group_full, &group_cond, GrmMeasure::Volume, ColumnNames { acre: "MORT_VOL_ACRE", total: "MORT_VOL_TOTAL" }, &config.base)?;
            merge_both(&tpa_table, &vol_table, &group_full)
        }
        other => {
            let measure = measure_for(other);
            let names = ColumnNames { acre: "MORT_ACRE", total: "MORT_TOTAL" };
            run_single(&tree, &frames, &group_full, &group_cond, measure, names, &config.base)?
        }
    };

    Ok(Outcome::with_warnings(table, warnings))
}

fn measure_for(mortality_type: MortalityType) -> GrmMeasure {
    match mortality_type {
        MortalityType::Tpa => GrmMeasure::Count,
        MortalityType::Volume => GrmMeasure::Volume,
        MortalityType::Biomass => GrmMeasure::Biomass,
        MortalityType::BasalArea => GrmMeasure::BasalArea,
        MortalityType::Both => unreachable!("handled by the caller"),
    }
}

#[allow(clippy::too_many_arguments)]
fn run_single(
    tree: &crate::frame::frame::Frame,
    frames: &crate::session::EstimationFrames,
    group_full: &[&str],
    group_cond: &[&str],
    measure: GrmMeasure,
    names: ColumnNames,
    base: &EstimatorConfig,
) -> Result<Table, FiaError> {
    let values: Vec<Option<f64>> =
        (0..tree.num_rows()).map(|r| Some(component_value(tree, r, measure, GrmBucket::Mortality))).collect();
    let tree = append_float_column(tree, "GRM_VALUE", values);
    let result = aggregate_grm(&tree, &frames.cond, &frames.strat, "GRM_VALUE", "SUBPTYP_GRM", group_full, group_cond);
    finish(&result, group_full, base.variance_method(), names, base)
}

/// Merge two independently built tables sharing the same grouping key into
/// one, appending the second's non-grouping columns.
fn merge_both(first: &Table, second: &Table, group_cols: &[&str]) -> Table {
    let extra_names: Vec<&str> =
        second.schema().names().iter().map(|s| s.as_str()).filter(|n| !group_cols.contains(n)).collect();
    let mut schema_cols: Vec<(String, crate::db::value::ColumnType)> = first
        .schema()
        .names()
        .iter()
        .map(|n| (n.clone(), first.schema().type_of(n).unwrap()))
        .collect();
    for &name in &extra_names {
        schema_cols.push((name.to_string(), second.schema().type_of(name).unwrap()));
    }
    let mut columns: Vec<crate::frame::frame::Column> =
        (0..first.schema().len()).map(|i| first.column_at(i).clone()).collect();
    for &name in &extra_names {
        columns.push(second.column(name).unwrap().clone());
    }
    let schema = crate::frame::frame::Schema::new(schema_cols);
    crate::frame::frame::Frame::new(schema, columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::backend::Backend;
    use crate::db::sqlite::SqliteBackend;

    fn fixture() -> Session {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.execute("CREATE TABLE PLOT (CN TEXT, STATECD INTEGER, INVYR INTEGER, MACRO_BREAKPOINT_DIA REAL, PLOT_STATUS_CD INTEGER, REMPER REAL)", &[]).unwrap();
        backend.execute("CREATE TABLE COND (PLT_CN TEXT, CONDID INTEGER, COND_STATUS_CD INTEGER, CONDPROP_UNADJ REAL, PROP_BASIS TEXT, SITECLCD INTEGER, RESERVCD INTEGER, FORTYPCD INTEGER, OWNGRPCD INTEGER)", &[]).unwrap();
        backend.execute("CREATE TABLE TREE_GRM_COMPONENT (PLT_CN TEXT, CONDID INTEGER, SPCD INTEGER, COMPONENT TEXT, SUBPTYP_GRM INTEGER, DIA_BEGIN REAL, DIA_MIDPT REAL, TPAGROW_UNADJ REAL, TPAMORT_UNADJ REAL, TPAREMV_UNADJ REAL, VOLCFNET_BEGIN REAL, VOLCFNET_MIDPT REAL, DRYBIO_AG_BEGIN REAL, DRYBIO_AG_MIDPT REAL)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_PLOT_STRATUM_ASSGN (PLT_CN TEXT, STRATUM_CN TEXT, EVALID INTEGER)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_STRATUM (CN TEXT, ESTN_UNIT_CN TEXT, EXPNS REAL, ADJ_FACTOR_MICR REAL, ADJ_FACTOR_SUBP REAL, ADJ_FACTOR_MACR REAL, P1POINTCNT INTEGER, P2POINTCNT INTEGER)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_ESTN_UNIT (CN TEXT, AREA_USED REAL, P1PNTCNT_EU INTEGER, P2PNTCNT_EU INTEGER)", &[]).unwrap();

        backend.execute("INSERT INTO PLOT VALUES ('p1', 37, 2020, 24.0, 1, 5.0)", &[]).unwrap();
        backend.execute("INSERT INTO COND VALUES ('p1', 1, 1, 1.0, 'SUBP', 3, 0, 121, 10)", &[]).unwrap();
        backend.execute("INSERT INTO TREE_GRM_COMPONENT VALUES ('p1', 1, 131, 'MORTALITY1', 1, 10.0, 12.0, 0.0, 4.0, 0.0, 12.0, 20.0, 100.0, 150.0)", &[]).unwrap();
        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',6000.0,1.0,1.0,1.0,10,10)", &[]).unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

        let session = Session::new(Box::new(backend));
        session.clip_by_evalid(vec![372018]);
        session
    }

    #[test]
    fn tpa_mortality_rejects_live_tree_type() {
        let mut base = EstimatorConfig::default();
        base.tree_type = crate::config::TreeTypeOption::Live;
        let config = MortalityConfig { base, mortality_type: MortalityType::Tpa };
        assert!(matches!(config.validate(), Err(ConfigError::IncompatibleTreeType { .. })));
    }

    #[test]
    fn mortality_default_produces_positive_value() {
        let session = fixture();
        let mut base = EstimatorConfig::default();
        base.tree_type = crate::config::TreeTypeOption::Dead;
        let config = MortalityConfig { base, mortality_type: MortalityType::Tpa };
        let out = mortality(&session, &config).unwrap();
        let value = out.value.get(0, "MORT_ACRE").as_f64().unwrap();
        assert!(value > 0.0);
    }

    #[test]
    fn a_survivor_row_on_the_same_table_does_not_inflate_mortality() {
        let session = fixture();
        let mut base = EstimatorConfig::default();
        base.tree_type = crate::config::TreeTypeOption::Dead;
        let config = MortalityConfig { base, mortality_type: MortalityType::Tpa };
        let baseline = mortality(&session, &config).unwrap().value.get(0, "MORT_ACRE").as_f64().unwrap();

        session
            .backend()
            .execute(
                "INSERT INTO TREE_GRM_COMPONENT VALUES \
                 ('p1', 1, 802, 'SURVIVOR', 1, 10.0, 12.0, 6.0, 0.0, 0.0, 12.0, 20.0, 100.0, 150.0)",
                &[],
            )
            .unwrap();

        let mixed = mortality(&session, &config).unwrap().value.get(0, "MORT_ACRE").as_f64().unwrap();
        assert!((mixed - baseline).abs() < 1e-9, "a growth-component row must contribute zero to mortality");
    }
}
