/// Errors that can occur while configuring or running a manifold
/// Bayesian optimization loop.
///
/// Configuration errors are raised at setup and never retried. Degenerate
/// candidates, non-finite observations and objective failures abort the
/// loop with [`LoopStatus::Failed`](crate::LoopStatus::Failed).
/// Non-convergence of a local refinement is not an error: it is reported
/// on [`RefinedCandidate`](crate::refine::RefinedCandidate) and counted
/// by the loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// Returned when a manifold name does not match any known manifold.
    #[error("unknown manifold '{0}', expected one of: sphere")]
    UnknownManifold(String),

    /// Returned when an acquisition function name is not recognised.
    #[error(
        "unknown acquisition function '{0}', expected one of: expected_improvement, log_expected_improvement"
    )]
    UnknownAcquisition(String),

    /// Returned when a surrogate family name is not recognised.
    #[error("unknown surrogate family '{0}', expected one of: exact, approximate")]
    UnknownSurrogate(String),

    /// Returned when a configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Returned when a sample count of zero is requested.
    #[error("invalid sample count: at least one point must be requested")]
    InvalidSampleCount,

    /// Returned when a point does not have the ambient dimension of the manifold.
    #[error("dimension mismatch: expected {expected} coordinates but got {got}")]
    DimensionMismatch {
        /// The expected number of ambient coordinates.
        expected: usize,
        /// The actual number of coordinates supplied.
        got: usize,
    },

    /// Returned when a point violates the manifold constraint.
    #[error("point is off the manifold (constraint residual {residual:e})")]
    OffManifold {
        /// Absolute deviation from the manifold constraint.
        residual: f64,
    },

    /// Returned when a seed or refined candidate is NaN or otherwise invalid.
    #[error("degenerate candidate: {0}")]
    DegenerateCandidate(String),

    /// Returned when an observed objective value is NaN or infinite.
    #[error("non-finite objective value {0} cannot be observed")]
    NonFiniteObservation(f64),

    /// Returned when the external objective function fails.
    #[error("objective evaluation failed: {0}")]
    ObjectiveEvaluation(String),

    /// Returned when a surrogate cannot be fitted to the observations.
    #[error("surrogate fit failed: {0}")]
    SurrogateFit(String),

    /// Returned when a surrogate is queried before it has been fitted.
    #[error("no observations available")]
    NoObservations,

    /// Returned when a metrics logger cannot persist a row.
    #[error("logger error: {0}")]
    Logger(String),

    /// Returned when an internal invariant is violated.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl Error {
    /// Whether the error must terminate a running loop.
    ///
    /// Every error reaching the loop controller is fatal except a logger
    /// failure, which only loses a metrics row.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Logger(_))
    }

    /// Whether the error belongs to the configuration family (raised at setup).
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownManifold(_)
                | Error::UnknownAcquisition(_)
                | Error::UnknownSurrogate(_)
                | Error::InvalidConfig(_)
        )
    }
}

pub type Result<T> = core::result::Result<T, Error>;
