//! Area estimator (spec.md §4.8 "area" row): condition-only, no tree frame
//! required. `AREA` (total acres) and `AREA_PERC` (percent of the reference
//! land area for the active `land_type`) are produced from
//! `CONDPROP_UNADJ` scaled by its `PROP_BASIS` adjustment and the
//! land-type domain indicator.
//!
//! `Y_HAT = T_Y / A` from the shared two-stage pipeline is a 0..1 fraction
//! (spec.md §8 property 2); this estimator is the one place that ratio is
//! rescaled to a 0..100 percent before it reaches the output formatter —
//! every other estimator's per-acre column is already in its native units.

use crate::aggregate::temporal::{apply_weights, plot_weights, TemporalMethod};
use crate::aggregate::two_stage::{aggregate, stage_3_4};
use crate::aggregate::variance::{estimate_variance, VarianceMethod, VarianceResult};
use crate::config::EstimatorConfig;
use crate::domain::filter::TreeType;
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{plot_level_table, resolve_group_columns, split_group_cols};
use crate::outcome::{Outcome, Warning};
use crate::output::formatter::{build_table, ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Default)]
pub struct AreaConfig {
    pub base: EstimatorConfig,
    /// Adds a `LAND_TYPE`-equivalent breakdown to the grouping key instead
    /// of collapsing to a single `land_type` domain (spec.md §6 `area`'s
    /// `by_land_type?` parameter). Only meaningful when `base.land_type ==
    /// All`, since otherwise there is nothing left to break down.
    pub by_land_type: bool,
}

impl AreaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported(
            "area",
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

pub fn area(session: &Session, config: &AreaConfig) -> Result<Outcome<Table>, FiaError> {
    config.validate()?;

    let mut warnings: Vec<Warning> = Vec::new();
    if config.base.most_recent {
        let out = session.clip_most_recent("EXPVOL")?;
        warnings.extend(out.warnings);
    }

    let frames = session.load_estimation_frames(
        config.base.land_type(),
        TreeType::All,
        false,
        None,
        config.base.area_domain.as_deref(),
        config.base.plot_domain.as_deref(),
    )?;

    let (resolved, group_warnings) = resolve_group_columns(&config.base.grp_by, &[], None, &frames.cond);
    warnings.extend(group_warnings);
    let (group_full, group_cond) = split_group_cols(&resolved, &frames.cond);

    let mut result = aggregate(None, &frames.cond, &frames.strat, "CONDPROP_UNADJ", &group_full, &group_cond);

    let method = config.base.temporal_method();
    if !matches!(method, TemporalMethod::Ti) {
        let weights = plot_weights(&result.plot_level.frame, method, None);
        let weighted = apply_weights(&result.plot_level.frame, &weights);
        let (stratum, population) = stage_3_4(&weighted, &frames.strat, &group_full);
        result.plot_level.frame = weighted;
        result.stratum_level.frame = stratum;
        result.population.frame = population;
    }

    if config.base.by_plot {
        let table = plot_level_table(&result.plot_level.frame, &group_full, ColumnNames { acre: "AREA_PERC", total: "AREA" });
        return Ok(Outcome::with_warnings(table, warnings));
    }

    let variances = estimate_variance(&result.plot_level.frame, &group_full, VarianceMethod::Hybrid)?;
    let as_percent: Vec<VarianceResult> = variances.into_iter().map(scale_to_percent).collect();

    let table = build_table(
        &result.population.frame,
        &as_percent,
        &group_full,
        ColumnNames { acre: "AREA_PERC", total: "AREA" },
        &config.base,
        &result.tree_counts,
    );

    Ok(Outcome::with_warnings(table, warnings))
}

/// Area's per-acre column is a percentage, not a per-acre ratio — rescale
/// `acre`/`acre_variance`/`acre_se` by 100/100²/100 respectively. `total`
/// (acres) and `total_variance`/`total_se` are left untouched.
fn scale_to_percent(mut v: VarianceResult) -> VarianceResult {
    v.acre *= 100.0;
    v.acre_variance = v.acre_variance.map(|x| x * 10_000.0);
    v.acre_se = v.acre_se.map(|x| x * 100.0);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;
    use crate::db::backend::Backend;

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
        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',6000.0,1.0,1.0,1.0,10,10)", &[]).unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

        let session = Session::new(Box::new(backend));
        session.clip_by_evalid(vec![372018]);
        session
    }

    #[test]
    fn forest_area_percent_is_bounded_zero_to_hundred() {
        let session = fixture();
        let config = AreaConfig::default();
        let out = area(&session, &config).unwrap();
        let pct = out.value.get(0, "AREA_PERC").as_f64().unwrap();
        assert!((0.0..=100.0).contains(&pct));
    }
}
