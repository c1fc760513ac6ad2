//! Retraction-based local refinement of a single restart seed.
//!
//! Riemannian steepest ascent: the ambient gradient of the score is
//! projected onto the tangent space at the current point, a step is taken
//! along that direction and retracted back onto the manifold. Step sizes
//! come from Armijo backtracking, so every accepted step strictly improves
//! the score and every iterate lies on the manifold.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionObjective;
use crate::error::{Error, Result};
use crate::manifold::Manifold;
use crate::types::Direction;

/// Manifold-membership tolerance enforced on refined candidates.
pub const MANIFOLD_TOLERANCE: f64 = 1e-6;

/// Stopping rules and line-search constants for [`CandidateRefiner`].
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RefinerConfig {
    /// Maximum number of gradient iterations.
    pub max_iterations: usize,
    /// Stop once the Riemannian gradient norm falls below this.
    pub min_gradient_norm: f64,
    /// Stop once an accepted step is shorter than this.
    pub min_step_size: f64,
    /// Length of the first trial step along the normalized gradient.
    pub initial_step: f64,
    /// Backtracking contraction factor, in `(0, 1)`.
    pub contraction: f64,
    /// Armijo sufficient-increase constant, in `(0, 1)`.
    pub sufficient_increase: f64,
    /// Maximum backtracking trials per iteration.
    pub max_backtracks: usize,
    /// `0` silent, `1` summary per refinement, `2` one event per step.
    pub verbosity: u8,
}

impl Default for RefinerConfig {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            min_gradient_norm: 1e-6,
            min_step_size: 1e-10,
            initial_step: 1.0,
            contraction: 0.5,
            sufficient_increase: 1e-4,
            max_backtracks: 30,
            verbosity: 0,
        }
    }
}

impl RefinerConfig {
    /// Checks that every constant is in range.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "refiner max_iterations must be at least 1".into(),
            ));
        }
        if !(self.initial_step > 0.0) {
            return Err(Error::InvalidConfig(
                "refiner initial_step must be positive".into(),
            ));
        }
        if !(self.contraction > 0.0 && self.contraction < 1.0) {
            return Err(Error::InvalidConfig(
                "refiner contraction must lie in (0, 1)".into(),
            ));
        }
        if !(self.sufficient_increase > 0.0 && self.sufficient_increase < 1.0) {
            return Err(Error::InvalidConfig(
                "refiner sufficient_increase must lie in (0, 1)".into(),
            ));
        }
        if self.min_gradient_norm < 0.0 || self.min_step_size < 0.0 {
            return Err(Error::InvalidConfig(
                "refiner tolerances must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

/// Why a refinement trajectory ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The Riemannian gradient norm fell below tolerance.
    GradientNorm,
    /// No acceptable step longer than the step tolerance exists.
    StepSize,
    /// The iteration cap was reached first.
    MaxIterations,
}

/// Result of refining one seed.
#[derive(Clone, Debug, PartialEq)]
pub struct RefinedCandidate {
    /// Best point of the trajectory, in ambient coordinates.
    pub point: Vec<f64>,
    /// Score at `point`.
    pub score: f64,
    /// Score of the seed.
    pub seed_score: f64,
    /// Gradient evaluations performed.
    pub iterations: usize,
    /// Whether a tolerance was met before the iteration cap.
    pub converged: bool,
    /// Why the trajectory ended.
    pub stop_reason: StopReason,
    /// Score after each accepted step, seed first.
    pub trace: Vec<f64>,
}

/// Local optimizer that never leaves the manifold.
///
/// `direction` orients the score: `Maximize` for acquisition functions,
/// `Minimize` to descend an arbitrary cost.
///
/// # Examples
///
/// ```
/// use manifold_bo::manifold::{Manifold, Sphere};
/// use manifold_bo::refine::{CandidateRefiner, RefinerConfig};
/// use manifold_bo::Direction;
///
/// let sphere = Sphere::new(2).unwrap();
/// let refiner = CandidateRefiner::new(&sphere, RefinerConfig::default(), Direction::Maximize);
/// let north = |x: &[f64]| x[2];
/// let refined = refiner.refine(&[1.0, 0.0, 0.0], &north).unwrap();
/// assert!(refined.score > 0.999);
/// assert!(sphere.contains(&refined.point, 1e-6));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct CandidateRefiner<'a> {
    manifold: &'a dyn Manifold,
    config: RefinerConfig,
    direction: Direction,
}

impl<'a> CandidateRefiner<'a> {
    /// Creates a refiner over `manifold`.
    #[must_use]
    pub fn new(manifold: &'a dyn Manifold, config: RefinerConfig, direction: Direction) -> Self {
        Self {
            manifold,
            config,
            direction,
        }
    }

    /// Refinement settings.
    #[must_use]
    pub fn config(&self) -> &RefinerConfig {
        &self.config
    }

    /// Refines `seed` against `objective`.
    ///
    /// Hitting the iteration cap is not an error: the best point of the
    /// trajectory is returned with `converged == false`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegenerateCandidate`] if the seed is not a finite
    /// point on the manifold, or if its score or gradient is NaN.
    pub fn refine(&self, seed: &[f64], objective: &dyn AcquisitionObjective) -> Result<RefinedCandidate> {
        self.manifold
            .validate(seed, MANIFOLD_TOLERANCE)
            .map_err(|e| Error::DegenerateCandidate(format!("seed {seed:?} rejected: {e}")))?;

        let sign = self.direction.sign();
        let seed_score = objective.value(seed);
        if seed_score.is_nan() {
            return Err(Error::DegenerateCandidate(format!(
                "score at seed {seed:?} is NaN"
            )));
        }

        let mut x = seed.to_vec();
        // Internally the oriented score `sign * f` is maximized.
        let mut gx = sign * seed_score;
        let mut trace = vec![seed_score];
        let mut iterations = 0;
        let mut stop_reason = StopReason::MaxIterations;

        for k in 0..self.config.max_iterations {
            iterations = k + 1;
            let ambient: Vec<f64> = objective
                .gradient(&x)
                .into_iter()
                .map(|g| sign * g)
                .collect();
            if ambient.iter().any(|g| g.is_nan()) {
                return Err(Error::DegenerateCandidate(format!(
                    "gradient at {x:?} is NaN"
                )));
            }
            let grad = self.manifold.project_to_tangent(&x, &ambient);
            let grad_norm = self.manifold.norm(&x, &grad);

            if self.config.verbosity >= 2 {
                trace_debug!(iteration = k, score = sign * gx, grad_norm, "refiner step");
            }

            if !(grad_norm >= self.config.min_gradient_norm) {
                stop_reason = StopReason::GradientNorm;
                break;
            }

            match self.backtrack(&x, gx, &grad, grad_norm, objective) {
                Some((next, g_next, step)) => {
                    x = next;
                    gx = g_next;
                    trace.push(sign * gx);
                    if step < self.config.min_step_size {
                        stop_reason = StopReason::StepSize;
                        break;
                    }
                }
                None => {
                    stop_reason = StopReason::StepSize;
                    break;
                }
            }
        }

        let converged = stop_reason != StopReason::MaxIterations;
        if self.config.verbosity >= 1 {
            trace_debug!(iterations, converged, score = sign * gx, "refinement finished");
        }

        Ok(RefinedCandidate {
            point: x,
            score: sign * gx,
            seed_score,
            iterations,
            converged,
            stop_reason,
            trace,
        })
    }

    /// Armijo backtracking along the ascent direction `grad`.
    ///
    /// Returns the accepted point, its oriented score and the step length,
    /// or `None` when no trial satisfies the sufficient-increase condition.
    fn backtrack(
        &self,
        x: &[f64],
        gx: f64,
        grad: &[f64],
        grad_norm: f64,
        objective: &dyn AcquisitionObjective,
    ) -> Option<(Vec<f64>, f64, f64)> {
        let sign = self.direction.sign();
        // Step length measured along the manifold, first trial `initial_step`.
        let mut t = self.config.initial_step / grad_norm;
        for _ in 0..self.config.max_backtracks {
            let step: Vec<f64> = grad.iter().map(|g| t * g).collect();
            let candidate = self.manifold.retract(x, &step);
            let g_candidate = sign * objective.value(&candidate);
            let required = gx + self.config.sufficient_increase * t * grad_norm * grad_norm;
            if g_candidate.is_finite() && g_candidate >= required && g_candidate > gx {
                return Some((candidate, g_candidate, t * grad_norm));
            }
            t *= self.config.contraction;
            if t * grad_norm < self.config.min_step_size {
                break;
            }
        }
        None
    }
}
