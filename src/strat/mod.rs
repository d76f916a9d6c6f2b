pub mod loader;

pub use loader::{plots_per_stratum, StratificationLoader};
