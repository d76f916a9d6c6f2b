use thiserror::Error;

/// Database adapter failure kind (see `db::backend::Backend`).
#[derive(Error, Debug)]
pub enum DbErrorKind {
    #[error("connect")]
    Connect,
    #[error("query")]
    Query,
    #[error("schema")]
    Schema,
}

/// Adapter-level failure. Carries which phase failed and the underlying cause;
/// never carries bound parameter values (those are logged separately, never
/// interpolated into the message).
#[derive(Error, Debug)]
#[error("database {kind}: {message}")]
pub struct DbError {
    pub kind: DbErrorKind,
    pub message: String,
    #[source]
    pub source: Option<anyhow::Error>,
}

impl DbError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self { kind: DbErrorKind::Connect, message: message.into(), source: None }
    }

    pub fn query(message: impl Into<String>) -> Self {
        Self { kind: DbErrorKind::Query, message: message.into(), source: None }
    }

    pub fn schema(message: impl Into<String>) -> Self {
        Self { kind: DbErrorKind::Schema, message: message.into(), source: None }
    }

    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(anyhow::Error::new(source));
        self
    }
}

/// Domain expression parser failure (see `domain::parser`).
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("empty domain expression")]
    Empty,
    #[error("syntax error in domain expression at position {pos}: {detail}")]
    Syntax { pos: usize, detail: String },
    #[error("forbidden token in domain expression: '{token}'")]
    Forbidden { token: String },
    #[error("unknown column '{column}' referenced in domain expression")]
    UnknownColumn { column: String },
}

/// Configuration validation failure for an `EstimatorConfig` or one of its
/// per-estimator refinements.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("{tree_type:?} tree_type is incompatible with {context}")]
    IncompatibleTreeType { tree_type: String, context: String },
    #[error("lambda must be in [0, 1], got {0}")]
    LambdaOutOfRange(f64),
    #[error("temporal method {method:?} is not supported by the {estimator} estimator")]
    UnsupportedTemporalMethod { method: String, estimator: String },
    #[error("unknown column '{0}' referenced in configuration")]
    UnknownColumn(String),
}

/// EVALID discovery/selection failure (see `eval::selector`).
#[derive(Error, Debug)]
pub enum EvalError {
    #[error("POP_EVAL table is missing an EVALID column")]
    MissingEvalidColumn,
    #[error("no EVALID selected; call clip_by_evalid/clip_by_state/clip_most_recent first")]
    NoActiveEvalid,
}

/// Stratification resolution failure (see `strat::loader`).
#[derive(Error, Debug)]
pub enum StratError {
    #[error("plot {plt_cn} has no stratum assignment under the active EVALID set")]
    MissingStratum { plt_cn: String },
}

/// Variance computation failure (see `aggregate::variance`).
#[derive(Error, Debug)]
pub enum VarianceError {
    #[error("plot-condition data required for variance estimation is not available for plot {plt_cn}")]
    MissingPlotCondition { plt_cn: String },
}

/// Query cancellation/timeout.
#[derive(Error, Debug)]
#[error("query exceeded timeout of {0:?}")]
pub struct TimeoutError(pub std::time::Duration);

/// Top-level error type returned by every public estimator and session
/// operation. One variant per spec error kind; never silently downgraded to
/// a warning (the two sanctioned recoverable cases live in `Outcome::warnings`
/// instead of here).
#[derive(Error, Debug)]
pub enum FiaError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Strat(#[from] StratError),
    #[error(transparent)]
    Variance(#[from] VarianceError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
}
