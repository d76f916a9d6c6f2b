//! The nine public estimators (spec.md §4.8), each a thin wrapper around
//! the shared C6/C7 pipeline in `aggregate` plus its own per-tree/per-
//! condition value function and default filters — composition over
//! inheritance, per § Design Notes.

pub mod area;
pub mod biomass;
pub mod carbon;
pub mod carbon_flux;
pub mod common;
pub mod grm;
pub mod growth;
pub mod mortality;
pub mod removals;
pub mod tpa;
pub mod volume;

pub use area::{area, AreaConfig};
pub use biomass::{biomass, BiomassComponent, BiomassConfig};
pub use carbon::{carbon, CarbonConfig};
pub use carbon_flux::{carbon_flux, CarbonFluxConfig};
pub use growth::{growth, GrowthConfig, GrowthMeasure};
pub use mortality::{mortality, MortalityConfig, MortalityType};
pub use removals::{removals, RemovalsConfig, RemovalsMeasure};
pub use tpa::{baa, tpa, TpaConfig};
pub use volume::{volume, VolType, VolumeConfig};
