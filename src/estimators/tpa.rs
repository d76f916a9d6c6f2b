//! Trees-per-acre and basal-area-per-acre estimators (spec.md §4.8 "tpa /
//! baa" row). Both share the same tree+condition frames and grouping;
//! only the per-tree value column differs (`TPA_UNADJ` vs.
//! `π·(DIA/24)²·TPA_UNADJ`).

use std::f64::consts::PI;

use crate::aggregate::temporal::{apply_weights, plot_weights, TemporalMethod};
use crate::aggregate::two_stage::{aggregate, stage_3_4};
use crate::aggregate::variance::VarianceMethod;
use crate::config::EstimatorConfig;
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{
    finish, resolve_group_columns, split_group_cols, with_derived_group_columns,
};
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Default)]
pub struct TpaConfig {
    pub base: EstimatorConfig,
}

impl TpaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported(
            "tpa",
            &[
                TemporalMethod::Ti,
                TemporalMethod::Annual,
                TemporalMethod::Sma,
                TemporalMethod::Lma,
                TemporalMethod::Ema { lambda: 0.0 },
            ],
        )
    }
}

pub fn tpa(session: &Session, config: &TpaConfig) -> Result<Outcome<Table>, FiaError> {
    run(session, config, "TPA_UNADJ", ColumnNames { acre: "TPA", total: "TPA_TOTAL" })
}

pub fn baa(session: &Session, config: &TpaConfig) -> Result<Outcome<Table>, FiaError> {
    run(session, config, "BAA_VALUE", ColumnNames { acre: "BAA", total: "BAA_TOTAL" })
}

fn run(session: &Session, config: &TpaConfig, value_col: &str, names: ColumnNames) -> Result<Outcome<Table>, FiaError> {
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
    let tree = frames.tree.expect("tpa/baa always requests the tree frame");

    let tree = with_baa_column(&tree);
    let ref_species = session.ref_species();
    let (tree, derived) = with_derived_group_columns(&tree, &config.base, ref_species.as_ref());

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &derived, Some(&tree), &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let mut result = aggregate(Some(&tree), &frames.cond, &frames.strat, value_col, &group_full, &group_cond);

    let method = config.base.temporal_method();
    if !matches!(method, TemporalMethod::Ti) {
        let weights = plot_weights(&result.plot_level.frame, method, None);
        let weighted = apply_weights(&result.plot_level.frame, &weights);
        let (stratum, population) = stage_3_4(&weighted, &frames.strat, &group_full);
        result.plot_level.frame = weighted;
        result.stratum_level.frame = stratum;
        result.population.frame = population;
    }

    let table = finish(&result, &group_full, VarianceMethod::Hybrid, names, &config.base)?;
    Ok(Outcome::with_warnings(table, warnings))
}

fn with_baa_column(tree: &crate::frame::frame::Frame) -> crate::frame::frame::Frame {
    use crate::estimators::common::append_float_column;
    let values: Vec<Option<f64>> = (0..tree.num_rows())
        .map(|r| {
            let dia = tree.get(r, "DIA").as_f64().unwrap_or(0.0);
            let tpa_unadj = tree.get(r, "TPA_UNADJ").as_f64().unwrap_or(0.0);
            Some(PI * (dia / 24.0).powi(2) * tpa_unadj)
        })
        .collect();
    append_float_column(tree, "BAA_VALUE", values)
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
        backend.execute("CREATE TABLE TREE (PLT_CN TEXT, CONDID INTEGER, STATUSCD INTEGER, TREECLCD INTEGER, CCLCD INTEGER, SPCD INTEGER, DIA REAL, TPA_UNADJ REAL, VOLCFNET REAL, VOLCSNET REAL, VOLCFGRS REAL, DRYBIO_AG REAL, DRYBIO_BG REAL)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_PLOT_STRATUM_ASSGN (PLT_CN TEXT, STRATUM_CN TEXT, EVALID INTEGER)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_STRATUM (CN TEXT, ESTN_UNIT_CN TEXT, EXPNS REAL, ADJ_FACTOR_MICR REAL, ADJ_FACTOR_SUBP REAL, ADJ_FACTOR_MACR REAL, P1POINTCNT INTEGER, P2POINTCNT INTEGER)", &[]).unwrap();
        backend.execute("CREATE TABLE POP_ESTN_UNIT (CN TEXT, AREA_USED REAL, P1PNTCNT_EU INTEGER, P2PNTCNT_EU INTEGER)", &[]).unwrap();

        backend.execute("INSERT INTO PLOT VALUES ('p1', 37, 2020, 24.0, 1, 5.0)", &[]).unwrap();
        backend.execute("INSERT INTO COND VALUES ('p1', 1, 1, 1.0, 'SUBP', 3, 0, 121, 10)", &[]).unwrap();
        backend.execute("INSERT INTO TREE VALUES ('p1', 1, 1, 2, 2, 131, 12.0, 1.0, 20.0, 18.0, 15.0, 500.0, 100.0)", &[]).unwrap();
        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',1.0,1.0,1.0,1.0,10,10)", &[]).unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

        let session = Session::new(Box::new(backend));
        session.clip_by_evalid(vec![372018]);
        session
    }

    #[test]
    fn single_twelve_inch_tree_baa_matches_known_value() {
        let session = fixture();
        let config = TpaConfig::default();
        let out = baa(&session, &config).unwrap();
        let value = out.value.get(0, "BAA").as_f64().unwrap();
        assert!((value - 0.7854).abs() < 1e-3, "expected ~0.7854, got {value}");
    }
}
