//! Design-based, stratified population estimation for USDA Forest Inventory
//! and Analysis (FIA) data (spec.md §1): tree-, condition-, and
//! plot-per-acre estimates of area, volume, biomass, carbon, growth,
//! mortality, and removals, aggregated up through strata and estimation
//! units the way Bechtold & Patterson (2005) describe.
//!
//! `Session` is the entry point: it wraps a `Backend`, tracks the active
//! `EVALID`s, and is passed by reference into each of the top-level
//! estimator functions in [`estimators`] alongside an `EstimatorConfig`.

pub mod aggregate;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod estimators;
pub mod eval;
pub mod frame;
pub mod outcome;
pub mod output;
pub mod session;
pub mod strat;

pub use config::EstimatorConfig;
pub use error::FiaError;
pub use estimators::{
    area, baa, biomass, carbon, carbon_flux, growth, mortality, removals, tpa, volume, AreaConfig, BiomassComponent,
    BiomassConfig, CarbonConfig, CarbonFluxConfig, GrowthConfig, GrowthMeasure, MortalityConfig, MortalityType,
    RemovalsConfig, RemovalsMeasure, TpaConfig, VolType, VolumeConfig,
};
pub use outcome::{Outcome, Warning};
pub use output::formatter::Table;
pub use session::Session;
