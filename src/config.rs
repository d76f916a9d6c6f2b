//! Validated configuration surface shared by every public estimator function
//! (spec.md §6). `EstimatorConfig` is the common core; each estimator wraps
//! it with its own required fields (e.g. `vol_type` for `volume`) rather than
//! inheriting by struct embedding, per the composition-over-inheritance note.

use serde::{Deserialize, Serialize};

use crate::aggregate::temporal::TemporalMethod;
use crate::aggregate::variance::VarianceMethod;
use crate::domain::filter::{LandType, TreeType};
use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub grp_by: Vec<String>,
    pub by_species: bool,
    pub by_size_class: bool,
    pub land_type: LandTypeOption,
    pub tree_type: TreeTypeOption,
    pub tree_domain: Option<String>,
    pub area_domain: Option<String>,
    pub plot_domain: Option<String>,
    pub method: MethodOption,
    pub lambda: Option<f64>,
    pub totals: bool,
    pub variance: bool,
    pub variance_method: VarianceMethodOption,
    pub by_plot: bool,
    pub most_recent: bool,
    pub lazy_config: LazyConfig,
}

impl EstimatorConfig {
    /// spec.md §7 "invalid combination" check — the temporal method's own
    /// lambda range and per-estimator support are validated by the caller
    /// via `TemporalMethod::require_supported`; this validates the fields
    /// that are meaningful regardless of estimator.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let MethodOption::Ema = self.method {
            let lambda = self.lambda.ok_or_else(|| ConfigError::Invalid("EMA method requires lambda".to_string()))?;
            if !(0.0..=1.0).contains(&lambda) {
                return Err(ConfigError::LambdaOutOfRange(lambda));
            }
        }
        Ok(())
    }

    pub fn land_type(&self) -> LandType {
        match self.land_type {
            LandTypeOption::Forest => LandType::Forest,
            LandTypeOption::Timber => LandType::Timberland,
            LandTypeOption::All => LandType::All,
        }
    }

    pub fn tree_type(&self) -> TreeType {
        match self.tree_type {
            TreeTypeOption::Live => TreeType::Live,
            TreeTypeOption::Dead => TreeType::Dead,
            TreeTypeOption::Gs => TreeType::GrowingStock,
            TreeTypeOption::Al => TreeType::AllLive,
            TreeTypeOption::Sawtimber => TreeType::Sawtimber,
            TreeTypeOption::All => TreeType::All,
        }
    }

    pub fn temporal_method(&self) -> TemporalMethod {
        match self.method {
            MethodOption::Ti => TemporalMethod::Ti,
            MethodOption::Annual => TemporalMethod::Annual,
            MethodOption::Sma => TemporalMethod::Sma,
            MethodOption::Lma => TemporalMethod::Lma,
            MethodOption::Ema => TemporalMethod::Ema { lambda: self.lambda.unwrap_or(0.5) },
        }
    }

    pub fn variance_method(&self) -> VarianceMethod {
        match self.variance_method {
            VarianceMethodOption::Standard => VarianceMethod::Standard,
            VarianceMethodOption::Ratio => VarianceMethod::Ratio,
            VarianceMethodOption::Hybrid => VarianceMethod::Hybrid,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandTypeOption {
    #[default]
    Forest,
    Timber,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeTypeOption {
    #[default]
    Live,
    Dead,
    Gs,
    Al,
    Sawtimber,
    All,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodOption {
    #[default]
    Ti,
    Annual,
    Sma,
    Lma,
    Ema,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VarianceMethodOption {
    #[default]
    Standard,
    Ratio,
    Hybrid,
}

/// Mirrors spec.md §6's `lazy_config` record. `threshold_rows` gates when
/// the `Streaming` collection strategy becomes mandatory rather than
/// advisory (spec.md §5 "Memory").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LazyConfig {
    pub mode: LazyMode,
    pub threshold_rows: u64,
    pub collection_strategy: CollectionStrategy,
    pub max_parallel_collections: u8,
    pub memory_limit_mb: MemoryLimit,
    pub chunk_size: u64,
    pub predicate_pushdown: bool,
    pub projection_pushdown: bool,
    pub slice_pushdown: bool,
    pub expression_caching: bool,
    pub cache_ttl_seconds: u64,
}

impl Default for LazyConfig {
    fn default() -> Self {
        Self {
            mode: LazyMode::Auto,
            threshold_rows: 1_000_000,
            collection_strategy: CollectionStrategy::Adaptive,
            max_parallel_collections: 4,
            memory_limit_mb: MemoryLimit::Limited(2048),
            chunk_size: 50_000,
            predicate_pushdown: true,
            projection_pushdown: true,
            slice_pushdown: true,
            expression_caching: true,
            cache_ttl_seconds: 300,
        }
    }
}

impl LazyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_collections == 0 || self.max_parallel_collections > 16 {
            return Err(ConfigError::Invalid("max_parallel_collections must be in 1..=16".to_string()));
        }
        if self.chunk_size < 1000 {
            return Err(ConfigError::Invalid("chunk_size must be >= 1000".to_string()));
        }
        if let MemoryLimit::Limited(mb) = self.memory_limit_mb {
            if mb < 100 {
                return Err(ConfigError::Invalid("memory_limit_mb must be >= 100 or unlimited".to_string()));
            }
        }
        Ok(())
    }

    /// A `Streaming` strategy is mandatory (not just selected) once the
    /// estimated row count crosses `threshold_rows` (spec.md §5).
    pub fn effective_strategy(&self, estimated_rows: u64) -> CollectionStrategy {
        if self.mode == LazyMode::Disabled {
            return CollectionStrategy::Sequential;
        }
        if estimated_rows > self.threshold_rows {
            return CollectionStrategy::Streaming;
        }
        self.collection_strategy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LazyMode {
    Auto,
    Enabled,
    Disabled,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionStrategy {
    Sequential,
    Parallel,
    Streaming,
    Adaptive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryLimit {
    Limited(u64),
    Unlimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_without_lambda_is_invalid() {
        let config = EstimatorConfig { method: MethodOption::Ema, lambda: None, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_lazy_config_passes_validation() {
        assert!(LazyConfig::default().validate().is_ok());
    }

    #[test]
    fn row_count_above_threshold_forces_streaming() {
        let config = LazyConfig { threshold_rows: 100, ..LazyConfig::default() };
        assert_eq!(config.effective_strategy(1000), CollectionStrategy::Streaming);
    }
}
