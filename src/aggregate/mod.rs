pub mod adjustment;
pub mod temporal;
pub mod two_stage;
pub mod util;
pub mod variance;

pub use adjustment::{cond_adj_factor, grm_adj_factor, tree_adj_factor};
pub use temporal::TemporalMethod;
pub use two_stage::{aggregate, aggregate_grm, Population, StratumLevel, PlotLevel, TwoStageResult};
pub use variance::{estimate_variance, VarianceMethod, VarianceResult};
