//! Optimization direction and loop lifecycle status.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The direction of optimization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    /// Minimize the objective value.
    #[default]
    Minimize,
    /// Maximize the objective value.
    Maximize,
}

impl Direction {
    /// Builds the direction from a `maximize` flag.
    #[must_use]
    pub fn from_maximize(maximize: bool) -> Self {
        if maximize {
            Direction::Maximize
        } else {
            Direction::Minimize
        }
    }

    /// Returns `true` when `candidate` is strictly better than `incumbent`.
    ///
    /// Ties are never an improvement, so the earliest best is kept.
    #[must_use]
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate < incumbent,
            Direction::Maximize => candidate > incumbent,
        }
    }

    /// Returns `true` when `candidate` is at least as good as `incumbent`.
    #[must_use]
    pub fn at_least_as_good(self, candidate: f64, incumbent: f64) -> bool {
        match self {
            Direction::Minimize => candidate <= incumbent,
            Direction::Maximize => candidate >= incumbent,
        }
    }

    /// Sign that turns the direction into maximization (`+1` or `-1`).
    #[must_use]
    pub fn sign(self) -> f64 {
        match self {
            Direction::Minimize => -1.0,
            Direction::Maximize => 1.0,
        }
    }
}

/// Lifecycle state of a [`BayesOptLoop`](crate::bo::BayesOptLoop).
///
/// `Initializing -> Iterating -> {Converged | Exhausted | Failed}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LoopStatus {
    /// Initial data is being evaluated.
    Initializing,
    /// Iterations are in progress.
    Iterating,
    /// The configured target value was reached.
    Converged,
    /// The iteration count or time budget ran out.
    Exhausted,
    /// An unrecoverable error aborted the loop.
    Failed,
}

impl LoopStatus {
    /// Whether no further iteration can run.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoopStatus::Converged | LoopStatus::Exhausted | LoopStatus::Failed
        )
    }
}
