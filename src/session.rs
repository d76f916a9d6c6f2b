//! Owns one database connection, its schema/reference caches, and its join
//! cache — no process-wide mutable singletons (`aggregate`/`estimators` take
//! a `&Session` rather than reaching for ambient global state).

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use tracing::info;

use crate::db::backend::Backend;
use crate::domain::classify::{assign_prop_basis, assign_tree_basis};
use crate::domain::filter::{land_type_indicator, tree_type_indicator, LandType, TreeType};
use crate::domain::parser;
use crate::error::FiaError;
use crate::eval::selector::{clip_frame_by_evalid, find_evalid};
use crate::frame::frame::{Column, Frame, Schema};
use crate::frame::join::{hash_join, JoinCache, JoinHow};
use crate::outcome::Outcome;
use crate::strat::loader::StratificationLoader;

/// Frames assembled for a single estimator call: condition-level rows
/// (always present) and tree-level rows (present when the estimator needs
/// per-tree values), both already carrying the adjustment-factor columns
/// broadcast from the stratification frame and the domain indicator columns
/// the two-stage aggregator expects.
pub struct EstimationFrames {
    pub cond: Frame,
    pub tree: Option<Frame>,
    pub strat: Frame,
}

pub struct Session {
    backend: Box<dyn Backend>,
    join_cache: JoinCache,
    active_evalids: RwLock<Vec<i64>>,
    ref_species: Mutex<Option<Frame>>,
}

impl Session {
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend, join_cache: JoinCache::new(32), active_evalids: RwLock::new(Vec::new()), ref_species: Mutex::new(None) }
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn join_cache(&self) -> &JoinCache {
        &self.join_cache
    }

    pub fn active_evalids(&self) -> Vec<i64> {
        self.active_evalids.read().expect("active_evalids lock poisoned").clone()
    }

    pub fn clip_by_evalid(&self, evalids: impl Into<Vec<i64>>) {
        *self.active_evalids.write().expect("active_evalids lock poisoned") = evalids.into();
    }

    pub fn find_evalid(&self, most_recent: bool, state: Option<i64>, eval_type: &str) -> Result<Outcome<Vec<i64>>, FiaError> {
        Ok(find_evalid(self.backend(), state, eval_type, most_recent)?)
    }

    pub fn clip_by_state(&self, states: &[i64], most_recent: bool, eval_type: &str) -> Result<Outcome<()>, FiaError> {
        let mut all = Vec::new();
        let mut warnings = Vec::new();
        for &state in states {
            let mut out = self.find_evalid(most_recent, Some(state), eval_type)?;
            all.append(&mut out.value);
            warnings.append(&mut out.warnings);
        }
        all.sort_unstable();
        all.dedup();
        self.clip_by_evalid(all);
        Ok(Outcome::with_warnings((), warnings))
    }

    pub fn clip_most_recent(&self, eval_type: &str) -> Result<Outcome<()>, FiaError> {
        let out = self.find_evalid(true, None, eval_type)?;
        self.clip_by_evalid(out.value);
        Ok(Outcome::with_warnings((), out.warnings))
    }

    /// Assemble condition (and, when `need_tree`, tree) frames restricted to
    /// the active EVALID set, with `DOMAIN_IND`/`tDOMAIN_IND`, `PROP_BASIS`,
    /// `TREE_BASIS`, and the broadcast `ADJ_FACTOR_*`/`W_H` columns attached.
    #[allow(clippy::too_many_arguments)]
    pub fn load_estimation_frames(
        &self,
        land_type: LandType,
        tree_type: TreeType,
        need_tree: bool,
        tree_domain: Option<&str>,
        area_domain: Option<&str>,
        plot_domain: Option<&str>,
    ) -> Result<EstimationFrames, FiaError> {
        let evalids = self.active_evalids();
        info!(n_evalids = evalids.len(), "loading estimation frames");

        let plot = self.backend().execute(
            "SELECT CN, STATECD, INVYR, MACRO_BREAKPOINT_DIA, PLOT_STATUS_CD, REMPER FROM PLOT",
            &[],
        )?;
        let plot = clip_frame_by_evalid(self.backend(), &plot, &evalids)?;

        let plot_cns: Vec<String> =
            (0..plot.num_rows()).filter_map(|r| plot.get(r, "CN").as_str().map(|s| s.to_string())).collect();

        let strat = StratificationLoader::load(self.backend(), &evalids, &plot_cns)?;

        let cond = self.load_cond(&plot, &plot_domain_predicate(plot_domain, &plot)?)?;
        let cond = self.with_broadcast_adj_factors(&cond, &strat);
        let cond = with_land_domain(&cond, land_type, area_domain)?;

        let tree = if need_tree {
            let tree = self.load_tree(&plot_cns)?;
            let tree = hash_join(&tree, &plot.select(&["CN", "MACRO_BREAKPOINT_DIA"]), &["PLT_CN"], &["CN"], JoinHow::Inner);
            let tree = with_tree_basis(&tree);
            let tree = self.with_broadcast_adj_factors(&tree, &strat);
            let tree = with_tree_domain(&tree, tree_type, tree_domain)?;
            Some(tree)
        } else {
            None
        };

        Ok(EstimationFrames { cond, tree, strat })
    }

    fn load_cond(&self, plot: &Frame, domain_mask: &HashMap<String, bool>) -> Result<Frame, FiaError> {
        let cond = self.backend().execute(
            "SELECT PLT_CN, CONDID, COND_STATUS_CD, CONDPROP_UNADJ, PROP_BASIS, SITECLCD, RESERVCD, \
             FORTYPCD, OWNGRPCD FROM COND",
            &[],
        )?;
        let plt_cns: std::collections::HashSet<&str> =
            (0..plot.num_rows()).filter_map(|r| plot.get(r, "CN").as_str()).collect();
        let rows: Vec<usize> = (0..cond.num_rows())
            .filter(|&r| {
                cond.get(r, "PLT_CN")
                    .as_str()
                    .map(|cn| plt_cns.contains(cn) && *domain_mask.get(cn).unwrap_or(&true))
                    .unwrap_or(false)
            })
            .collect();
        Ok(cond.gather(&rows))
    }

    fn load_tree(&self, plot_cns: &[String]) -> Result<Frame, FiaError> {
        let wanted: std::collections::HashSet<&str> = plot_cns.iter().map(|s| s.as_str()).collect();
        let tree = self.backend().execute(
            "SELECT PLT_CN, CONDID, STATUSCD, TREECLCD, CCLCD, SPCD, DIA, TPA_UNADJ, VOLCFNET, VOLCSNET, \
             VOLCFGRS, DRYBIO_AG, DRYBIO_BG FROM TREE",
            &[],
        )?;
        let rows: Vec<usize> = (0..tree.num_rows())
            .filter(|&r| tree.get(r, "PLT_CN").as_str().map(|cn| wanted.contains(cn)).unwrap_or(false))
            .collect();
        Ok(tree.gather(&rows))
    }

    /// Broadcast `ADJ_FACTOR_MICR/SUBP/MACR` and `W_H` from the
    /// per-plot stratification frame onto `frame` (tree- or
    /// condition-level) via `PLT_CN`.
    fn with_broadcast_adj_factors(&self, frame: &Frame, strat: &Frame) -> Frame {
        let strat_cols = strat.select(&["PLT_CN", "ADJ_FACTOR_MICR", "ADJ_FACTOR_SUBP", "ADJ_FACTOR_MACR", "W_H"]);
        hash_join(frame, &strat_cols, &["PLT_CN"], &["PLT_CN"], JoinHow::Inner)
    }

    /// Assemble condition and GRM-component tree frames for the growth,
    /// mortality, and removals estimators (`estimators::grm`). The GRM
    /// component table (`TREE_GRM_COMPONENT`) already carries `COMPONENT`
    /// and `SUBPTYP_GRM` per record, so unlike [`load_estimation_frames`]
    /// no `TREE_BASIS` is derived here — component routing happens in the
    /// estimator, and the adjustment factor is picked directly off
    /// `SUBPTYP_GRM` by [`crate::aggregate::adjustment::grm_adj_factor`].
    pub fn load_grm_frames(
        &self,
        land_type: LandType,
        tree_domain: Option<&str>,
        area_domain: Option<&str>,
        plot_domain: Option<&str>,
    ) -> Result<EstimationFrames, FiaError> {
        let evalids = self.active_evalids();
        info!(n_evalids = evalids.len(), "loading GRM estimation frames");

        let plot = self.backend().execute(
            "SELECT CN, STATECD, INVYR, MACRO_BREAKPOINT_DIA, PLOT_STATUS_CD, REMPER FROM PLOT",
            &[],
        )?;
        let plot = clip_frame_by_evalid(self.backend(), &plot, &evalids)?;

        let plot_cns: Vec<String> =
            (0..plot.num_rows()).filter_map(|r| plot.get(r, "CN").as_str().map(|s| s.to_string())).collect();

        let strat = StratificationLoader::load(self.backend(), &evalids, &plot_cns)?;

        let cond = self.load_cond(&plot, &plot_domain_predicate(plot_domain, &plot)?)?;
        let cond = self.with_broadcast_adj_factors(&cond, &strat);
        let cond = with_land_domain(&cond, land_type, area_domain)?;

        let grm = self.load_grm_tree(&plot_cns)?;
        let grm = hash_join(&grm, &plot.select(&["CN", "REMPER"]), &["PLT_CN"], &["CN"], JoinHow::Inner);
        let grm = self.with_broadcast_adj_factors(&grm, &strat);
        let grm = with_tree_domain(&grm, TreeType::All, tree_domain)?;

        Ok(EstimationFrames { cond, tree: Some(grm), strat })
    }

    fn load_grm_tree(&self, plot_cns: &[String]) -> Result<Frame, FiaError> {
        let wanted: std::collections::HashSet<&str> = plot_cns.iter().map(|s| s.as_str()).collect();
        let grm = self.backend().execute(
            "SELECT PLT_CN, CONDID, SPCD, COMPONENT, SUBPTYP_GRM, DIA_BEGIN, DIA_MIDPT, \
             TPAGROW_UNADJ, TPAMORT_UNADJ, TPAREMV_UNADJ, VOLCFNET_BEGIN, VOLCFNET_MIDPT, \
             DRYBIO_AG_BEGIN, DRYBIO_AG_MIDPT FROM TREE_GRM_COMPONENT",
            &[],
        )?;
        let rows: Vec<usize> = (0..grm.num_rows())
            .filter(|&r| grm.get(r, "PLT_CN").as_str().map(|cn| wanted.contains(cn)).unwrap_or(false))
            .collect();
        Ok(grm.gather(&rows))
    }

    pub fn set_ref_species(&self, frame: Frame) {
        *self.ref_species.lock().expect("ref_species lock poisoned") = Some(frame);
    }

    pub fn ref_species(&self) -> Option<Frame> {
        self.ref_species.lock().expect("ref_species lock poisoned").clone()
    }
}

fn plot_domain_predicate(plot_domain: Option<&str>, plot: &Frame) -> Result<HashMap<String, bool>, FiaError> {
    let mut mask = HashMap::new();
    let predicate = match plot_domain {
        Some(expr) => Some(parser::parse(expr)?),
        None => None,
    };
    for r in 0..plot.num_rows() {
        if let Some(cn) = plot.get(r, "CN").as_str() {
            let keep = predicate.as_ref().map(|p| p.eval(plot, r)).unwrap_or(true);
            mask.insert(cn.to_string(), keep);
        }
    }
    Ok(mask)
}

fn with_land_domain(cond: &Frame, land_type: LandType, area_domain: Option<&str>) -> Result<Frame, FiaError> {
    let base = land_type_indicator(cond, land_type);
    let extra = match area_domain {
        Some(expr) => {
            let predicate = parser::parse(expr)?;
            Some((0..cond.num_rows()).map(|r| predicate.eval(cond, r)).collect::<Vec<bool>>())
        }
        None => None,
    };
    let combined: Vec<Option<f64>> = (0..cond.num_rows())
        .map(|r| {
            let mut v = base.get(r).as_f64().unwrap_or(0.0);
            if let Some(extra) = &extra {
                if !extra[r] {
                    v = 0.0;
                }
            }
            Some(v)
        })
        .collect();
    Ok(append_float_column(cond, "DOMAIN_IND", combined))
}

fn with_tree_domain(tree: &Frame, tree_type: TreeType, tree_domain: Option<&str>) -> Result<Frame, FiaError> {
    let base = tree_type_indicator(tree, tree_type);
    let extra = match tree_domain {
        Some(expr) => {
            let predicate = parser::parse(expr)?;
            Some((0..tree.num_rows()).map(|r| predicate.eval(tree, r)).collect::<Vec<bool>>())
        }
        None => None,
    };
    let combined: Vec<Option<f64>> = (0..tree.num_rows())
        .map(|r| {
            let mut v = base.get(r).as_f64().unwrap_or(0.0);
            if let Some(extra) = &extra {
                if !extra[r] {
                    v = 0.0;
                }
            }
            Some(v)
        })
        .collect();
    Ok(append_float_column(tree, "tDOMAIN_IND", combined))
}

fn with_tree_basis(tree: &Frame) -> Frame {
    let basis: Vec<Option<String>> = (0..tree.num_rows())
        .map(|r| {
            let dia = tree.get(r, "DIA").as_f64().unwrap_or(0.0);
            let breakpoint = tree.get(r, "MACRO_BREAKPOINT_DIA").as_f64();
            Some(assign_tree_basis(dia, breakpoint).to_string())
        })
        .collect();

    let mut names: Vec<(String, crate::db::value::ColumnType)> =
        tree.schema().names().iter().map(|n| (n.clone(), tree.schema().type_of(n).unwrap())).collect();
    names.push(("TREE_BASIS".to_string(), crate::db::value::ColumnType::Text));
    let mut columns: Vec<Column> = (0..tree.schema().len()).map(|i| tree.column_at(i).clone()).collect();
    columns.push(Column::Text(basis));
    let frame = Frame::new(Schema::new(names), columns);

    let prop_basis: Vec<Option<String>> = (0..frame.num_rows())
        .map(|r| Some(assign_prop_basis(frame.get(r, "MACRO_BREAKPOINT_DIA").as_f64()).to_string()))
        .collect();
    append_text_column(&frame, "PROP_BASIS", prop_basis)
}

fn append_float_column(frame: &Frame, name: &str, values: Vec<Option<f64>>) -> Frame {
    let mut names: Vec<(String, crate::db::value::ColumnType)> =
        frame.schema().names().iter().map(|n| (n.clone(), frame.schema().type_of(n).unwrap())).collect();
    names.push((name.to_string(), crate::db::value::ColumnType::Float));
    let mut columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    columns.push(Column::Float(values));
    Frame::new(Schema::new(names), columns)
}

fn append_text_column(frame: &Frame, name: &str, values: Vec<Option<String>>) -> Frame {
    let mut names: Vec<(String, crate::db::value::ColumnType)> =
        frame.schema().names().iter().map(|n| (n.clone(), frame.schema().type_of(n).unwrap())).collect();
    names.push((name.to_string(), crate::db::value::ColumnType::Text));
    let mut columns: Vec<Column> = (0..frame.schema().len()).map(|i| frame.column_at(i).clone()).collect();
    columns.push(Column::Text(values));
    Frame::new(Schema::new(names), columns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::SqliteBackend;

    fn fixture() -> Session {
        let backend = SqliteBackend::in_memory().unwrap();
        backend
            .execute(
                "CREATE TABLE PLOT (CN TEXT, STATECD INTEGER, INVYR INTEGER, MACRO_BREAKPOINT_DIA REAL, \
                 PLOT_STATUS_CD INTEGER, REMPER REAL)",
                &[],
            )
            .unwrap();
        backend
            .execute(
                "CREATE TABLE COND (PLT_CN TEXT, CONDID INTEGER, COND_STATUS_CD INTEGER, CONDPROP_UNADJ REAL, \
                 PROP_BASIS TEXT, SITECLCD INTEGER, RESERVCD INTEGER, FORTYPCD INTEGER, OWNGRPCD INTEGER)",
                &[],
            )
            .unwrap();
        backend
            .execute(
                "CREATE TABLE TREE (PLT_CN TEXT, CONDID INTEGER, STATUSCD INTEGER, TREECLCD INTEGER, \
                 CCLCD INTEGER, SPCD INTEGER, DIA REAL, TPA_UNADJ REAL, VOLCFNET REAL, VOLCSNET REAL, \
                 VOLCFGRS REAL, DRYBIO_AG REAL, DRYBIO_BG REAL)",
                &[],
            )
            .unwrap();
        backend
            .execute("CREATE TABLE POP_PLOT_STRATUM_ASSGN (PLT_CN TEXT, STRATUM_CN TEXT, EVALID INTEGER)", &[])
            .unwrap();
        backend
            .execute(
                "CREATE TABLE POP_STRATUM (CN TEXT, ESTN_UNIT_CN TEXT, EXPNS REAL, ADJ_FACTOR_MICR REAL, \
                 ADJ_FACTOR_SUBP REAL, ADJ_FACTOR_MACR REAL, P1POINTCNT INTEGER, P2POINTCNT INTEGER)",
                &[],
            )
            .unwrap();
        backend
            .execute("CREATE TABLE POP_ESTN_UNIT (CN TEXT, AREA_USED REAL, P1PNTCNT_EU INTEGER, P2PNTCNT_EU INTEGER)", &[])
            .unwrap();

        backend.execute("INSERT INTO PLOT VALUES ('p1', 37, 2020, 24.0, 1, 5.0)", &[]).unwrap();
        backend.execute("INSERT INTO COND VALUES ('p1', 1, 1, 1.0, 'SUBP', 3, 0, 121, 10)", &[]).unwrap();
        backend.execute("INSERT INTO TREE VALUES ('p1', 1, 1, 2, 2, 131, 12.0, 6.0, 20.0, 18.0, 15.0, 500.0, 100.0)", &[])
            .unwrap();
        backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
        backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',6000.0,1.0,1.0,1.0,10,10)", &[]).unwrap();
        backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

        let session = Session::new(Box::new(backend));
        session.clip_by_evalid(vec![372018]);
        session
    }

    #[test]
    fn load_estimation_frames_attaches_domain_and_basis_columns() {
        let session = fixture();
        let frames = session
            .load_estimation_frames(LandType::Forest, TreeType::Live, true, None, None, None)
            .unwrap();
        assert_eq!(frames.cond.num_rows(), 1);
        assert_eq!(frames.cond.get(0, "DOMAIN_IND").as_f64(), Some(1.0));
        let tree = frames.tree.unwrap();
        assert_eq!(tree.num_rows(), 1);
        assert_eq!(tree.get(0, "TREE_BASIS").as_str(), Some("SUBP"));
        assert_eq!(tree.get(0, "tDOMAIN_IND").as_f64(), Some(1.0));
    }
}
