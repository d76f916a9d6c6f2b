//! Volume estimator (spec.md §4.8 "volume" row): net, gross, or sawlog
//! cubic-foot volume per acre, from `TREE.VOLCFNET/VOLCFGRS/VOLCSNET`.

use crate::aggregate::temporal::{apply_weights, plot_weights, TemporalMethod};
use crate::aggregate::two_stage::{aggregate, stage_3_4};
use crate::aggregate::variance::VarianceMethod;
use crate::config::EstimatorConfig;
use crate::error::{ConfigError, FiaError};
use crate::estimators::common::{finish, resolve_group_columns, split_group_cols, with_derived_group_columns};
use crate::outcome::Outcome;
use crate::output::formatter::{ColumnNames, Table};
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolType {
    Net,
    Gross,
    Sawlog,
}

impl Default for VolType {
    fn default() -> Self {
        VolType::Net
    }
}

impl VolType {
    fn column(self) -> &'static str {
        match self {
            VolType::Net => "VOLCFNET",
            VolType::Gross => "VOLCFGRS",
            VolType::Sawlog => "VOLCSNET",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VolumeConfig {
    pub base: EstimatorConfig,
    pub vol_type: VolType,
}

impl VolumeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.base.validate()?;
        self.base.temporal_method().require_supported("volume", &[TemporalMethod::Ti, TemporalMethod::Annual])
    }
}

pub fn volume(session: &Session, config: &VolumeConfig) -> Result<Outcome<Table>, FiaError> {
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
    let tree = frames.tree.expect("volume always requests the tree frame");

    let ref_species = session.ref_species();
    let (tree, derived) = with_derived_group_columns(&tree, &config.base, ref_species.as_ref());

    let value_col = config.vol_type.column();
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

    let names = ColumnNames { acre: "VOL_ACRE", total: "VOL_TOTAL" };
    let table = finish(&result, &group_full, VarianceMethod::Hybrid, names, &config.base)?;
    Ok(Outcome::with_warnings(table, warnings))
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
        backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',6000.0,1.0,1.0,1.0,10,10)", &[]).unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

        let session = Session::new(Box::new(backend));
        session.clip_by_evalid(vec![372018]);
        session
    }

    #[test]
    fn net_volume_per_acre_is_positive() {
        let session = fixture();
        let config = VolumeConfig::default();
        let out = volume(&session, &config).unwrap();
        let value = out.value.get(0, "VOL_ACRE").as_f64().unwrap();
        assert!(value > 0.0);
    }
}
