//! End-to-end tests against the public facade, exercising the full
//! database-to-table path through an in-memory `SqliteBackend` rather than
//! a single module's internals. Complements (does not duplicate) the
//! `#[cfg(test)]` unit tests embedded in each estimator.

use fia_estimate::db::{Backend, SqliteBackend};
use fia_estimate::{
    area, baa, biomass, carbon, carbon_flux, growth, mortality, removals, tpa, volume,
    AreaConfig, BiomassComponent, BiomassConfig, CarbonConfig, CarbonFluxConfig, EstimatorConfig,
    GrowthConfig, MortalityConfig, MortalityType, RemovalsConfig, Session, TpaConfig, VolumeConfig,
};

// ============================================================================
// Fixture: a two-plot, two-stratum inventory spanning one EVALID
// ============================================================================

fn create_test_session() -> Session {
    let backend = SqliteBackend::in_memory().unwrap();

    backend
        .execute(
            "CREATE TABLE PLOT (CN TEXT, STATECD INTEGER, INVYR INTEGER, \
             MACRO_BREAKPOINT_DIA REAL, PLOT_STATUS_CD INTEGER, REMPER REAL)",
            &[],
        )
        .unwrap();
    backend
        .execute(
            "CREATE TABLE COND (PLT_CN TEXT, CONDID INTEGER, COND_STATUS_CD INTEGER, \
             CONDPROP_UNADJ REAL, PROP_BASIS TEXT, SITECLCD INTEGER, RESERVCD INTEGER, \
             FORTYPCD INTEGER, OWNGRPCD INTEGER)",
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
        .execute(
            "CREATE TABLE TREE_GRM_COMPONENT (PLT_CN TEXT, CONDID INTEGER, SPCD INTEGER, \
             COMPONENT TEXT, SUBPTYP_GRM INTEGER, DIA_BEGIN REAL, DIA_MIDPT REAL, \
             TPAGROW_UNADJ REAL, TPAMORT_UNADJ REAL, TPAREMV_UNADJ REAL, VOLCFNET_BEGIN REAL, \
             VOLCFNET_MIDPT REAL, DRYBIO_AG_BEGIN REAL, DRYBIO_AG_MIDPT REAL)",
            &[],
        )
        .unwrap();
    backend
        .execute("CREATE TABLE POP_PLOT_STRATUM_ASSGN (PLT_CN TEXT, STRATUM_CN TEXT, EVALID INTEGER)", &[])
        .unwrap();
    backend
        .execute(
            "CREATE TABLE POP_STRATUM (CN TEXT, ESTN_UNIT_CN TEXT, EXPNS REAL, \
             ADJ_FACTOR_MICR REAL, ADJ_FACTOR_SUBP REAL, ADJ_FACTOR_MACR REAL, \
             P1POINTCNT INTEGER, P2POINTCNT INTEGER)",
            &[],
        )
        .unwrap();
    backend
        .execute("CREATE TABLE POP_ESTN_UNIT (CN TEXT, AREA_USED REAL, P1PNTCNT_EU INTEGER, P2PNTCNT_EU INTEGER)", &[])
        .unwrap();

    // Two plots in the same estimation unit but different strata, each with
    // one live and one dead tree on a single forested condition.
    backend.execute("INSERT INTO PLOT VALUES ('p1', 37, 2020, 24.0, 1, 5.0)", &[]).unwrap();
    backend.execute("INSERT INTO PLOT VALUES ('p2', 37, 2020, 24.0, 1, 5.0)", &[]).unwrap();

    backend.execute("INSERT INTO COND VALUES ('p1', 1, 1, 1.0, 'SUBP', 3, 0, 121, 10)", &[]).unwrap();
    backend.execute("INSERT INTO COND VALUES ('p2', 1, 1, 1.0, 'SUBP', 3, 0, 121, 10)", &[]).unwrap();

    backend
        .execute(
            "INSERT INTO TREE VALUES ('p1', 1, 1, 2, 2, 131, 12.0, 6.0, 20.0, 18.0, 22.0, 500.0, 100.0)",
            &[],
        )
        .unwrap();
    backend
        .execute(
            "INSERT INTO TREE VALUES ('p1', 1, 2, 2, 2, 802, 8.0, 3.0, 10.0, 9.0, 11.0, 200.0, 40.0)",
            &[],
        )
        .unwrap();
    backend
        .execute(
            "INSERT INTO TREE VALUES ('p2', 1, 1, 2, 2, 131, 14.0, 5.0, 25.0, 22.0, 27.0, 600.0, 120.0)",
            &[],
        )
        .unwrap();

    backend
        .execute(
            "INSERT INTO TREE_GRM_COMPONENT VALUES \
             ('p1', 1, 131, 'SURVIVOR', 1, 10.0, 12.0, 6.0, 0.0, 0.0, 18.0, 20.0, 450.0, 500.0)",
            &[],
        )
        .unwrap();
    backend
        .execute(
            "INSERT INTO TREE_GRM_COMPONENT VALUES \
             ('p2', 1, 131, 'MORTALITY1', 1, 9.0, 11.0, 0.0, 4.0, 0.0, 16.0, 18.0, 400.0, 450.0)",
            &[],
        )
        .unwrap();

    backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p1','s1',372018)", &[]).unwrap();
    backend.execute("INSERT INTO POP_PLOT_STRATUM_ASSGN VALUES ('p2','s2',372018)", &[]).unwrap();
    backend.execute("INSERT INTO POP_STRATUM VALUES ('s1','u1',3000.0,1.0,1.0,1.0,5,5)", &[]).unwrap();
    backend.execute("INSERT INTO POP_STRATUM VALUES ('s2','u1',3000.0,1.0,1.0,1.0,5,5)", &[]).unwrap();
    backend.execute("INSERT INTO POP_ESTN_UNIT VALUES ('u1', 500000.0, 10, 10)", &[]).unwrap();

    let session = Session::new(Box::new(backend));
    session.clip_by_evalid(vec![372018]);
    session
}

// ============================================================================
// Area, TPA, BAA
// ============================================================================

#[test]
fn area_percent_is_bounded_and_has_one_plot_group() {
    let session = create_test_session();
    let out = area(&session, &AreaConfig::default()).unwrap();
    assert!(out.warnings.is_empty());
    assert_eq!(out.value.num_rows(), 1);
    let pct = out.value.get(0, "AREA_PERC").as_f64().unwrap();
    assert!((0.0..=100.0).contains(&pct));
}

#[test]
fn tpa_grouped_by_species_splits_into_two_rows() {
    let session = create_test_session();
    let mut config = TpaConfig::default();
    config.base.grp_by = vec!["SPCD".to_string()];
    config.base.totals = true;

    let out = tpa(&session, &config).unwrap();
    assert_eq!(out.value.num_rows(), 2);
    for r in 0..out.value.num_rows() {
        assert!(out.value.get(r, "TPA").as_f64().unwrap() > 0.0);
        assert!(out.value.get(r, "TPA_TOTAL").as_f64().unwrap() > 0.0);
    }
}

#[test]
fn baa_matches_known_value_for_a_twelve_inch_tree() {
    let session = create_test_session();
    let mut config = TpaConfig::default();
    config.base.tree_domain = Some("SPCD == 131".to_string());

    let out = baa(&session, &config).unwrap();
    // Two trees of SPCD 131 at DIA 12.0 and 14.0; the per-acre BAA should
    // exceed the single-tree BA of the 12" stem (0.7854 sq ft).
    let value = out.value.get(0, "BAA").as_f64().unwrap();
    assert!(value > 0.7854);
}

// ============================================================================
// Volume, biomass, carbon
// ============================================================================

#[test]
fn net_volume_is_positive_and_totals_scale_with_area() {
    let session = create_test_session();
    let mut config = VolumeConfig::default();
    config.base.totals = true;

    let out = volume(&session, &config).unwrap();
    let acre = out.value.get(0, "VOL_ACRE").as_f64().unwrap();
    let total = out.value.get(0, "VOL_TOTAL").as_f64().unwrap();
    assert!(acre > 0.0);
    assert!(total > 0.0);
}

#[test]
fn total_biomass_equals_ag_plus_bg_component_sum() {
    let session = create_test_session();

    let mut ag_config = BiomassConfig::default();
    ag_config.component = BiomassComponent::Ag;
    let mut bg_config = BiomassConfig::default();
    bg_config.component = BiomassComponent::Bg;
    let mut total_config = BiomassConfig::default();
    total_config.component = BiomassComponent::Total;

    let ag = biomass(&session, &ag_config).unwrap().value.get(0, "BIO_ACRE").as_f64().unwrap();
    let bg = biomass(&session, &bg_config).unwrap().value.get(0, "BIO_ACRE").as_f64().unwrap();
    let total = biomass(&session, &total_config).unwrap().value.get(0, "BIO_ACRE").as_f64().unwrap();

    assert!((total - (ag + bg)).abs() / total <= 1e-6);
}

#[test]
fn carbon_is_biomass_scaled_by_the_carbon_fraction() {
    let session = create_test_session();
    let bio = biomass(&session, &BiomassConfig { component: BiomassComponent::Total, ..Default::default() })
        .unwrap()
        .value
        .get(0, "BIO_ACRE")
        .as_f64()
        .unwrap();
    let carb = carbon(&session, &CarbonConfig::default()).unwrap().value.get(0, "CARB_ACRE").as_f64().unwrap();
    assert!((carb - bio * 0.47).abs() / carb <= 1e-6);
}

// ============================================================================
// Growth, mortality, removals, carbon flux
// ============================================================================

#[test]
fn growth_is_positive_for_a_surviving_tree() {
    let session = create_test_session();
    let out = growth(&session, &GrowthConfig::default()).unwrap();
    assert!(out.value.get(0, "GROWTH_ACRE").as_f64().unwrap() > 0.0);
}

#[test]
fn mortality_tpa_requires_a_dead_or_all_tree_type() {
    let session = create_test_session();
    let mut base = EstimatorConfig::default();
    base.tree_type = fia_estimate::config::TreeTypeOption::Dead;
    let config = MortalityConfig { base, mortality_type: MortalityType::Tpa };

    let out = mortality(&session, &config).unwrap();
    assert!(out.value.get(0, "MORT_ACRE").as_f64().unwrap() > 0.0);
}

#[test]
fn mortality_rejects_live_tree_type_for_tpa() {
    let mut base = EstimatorConfig::default();
    base.tree_type = fia_estimate::config::TreeTypeOption::Live;
    let config = MortalityConfig { base, mortality_type: MortalityType::Tpa };
    assert!(config.validate().is_err());
}

#[test]
fn removals_defaults_to_a_non_negative_volume_measure() {
    let session = create_test_session();
    let out = removals(&session, &RemovalsConfig::default()).unwrap();
    assert!(out.value.get(0, "REMV_ACRE").as_f64().unwrap() >= 0.0);
}

#[test]
fn carbon_flux_components_sum_to_the_net_figure() {
    let session = create_test_session();
    let mut config = CarbonFluxConfig::default();
    config.include_components = true;

    let out = carbon_flux(&session, &config).unwrap();
    let net = out.value.get(0, "NET_CARBON_FLUX_ACRE").as_f64().unwrap();
    let g = out.value.get(0, "GROWTH_C_ACRE").as_f64().unwrap();
    let m = out.value.get(0, "MORT_C_ACRE").as_f64().unwrap();
    let r = out.value.get(0, "REMV_C_ACRE").as_f64().unwrap();
    assert!((net - (g - m - r)).abs() < 1e-9);
}

// ============================================================================
// Cross-cutting behavior: warnings, grouping, EVALID clipping
// ============================================================================

#[test]
fn unknown_group_column_surfaces_as_a_warning_not_an_error() {
    let session = create_test_session();
    let mut config = TpaConfig::default();
    config.base.grp_by = vec!["NOT_A_REAL_COLUMN".to_string()];

    let out = tpa(&session, &config).unwrap();
    assert_eq!(out.warnings.len(), 1);
    assert_eq!(out.value.num_rows(), 1);
}

#[test]
fn clip_by_evalid_narrows_the_active_population() {
    let session = create_test_session();
    assert_eq!(session.active_evalids(), vec![372018]);

    session.clip_by_evalid(vec![999999]);
    let frames = session.load_estimation_frames(
        fia_estimate::EstimatorConfig::default().land_type(),
        fia_estimate::EstimatorConfig::default().tree_type(),
        false,
        None,
        None,
        None,
    );
    assert!(frames.unwrap().cond.num_rows() == 0);
}
