//! Multi-restart acquisition optimization on a manifold.
//!
//! 1. **Raw sampling**: `raw_samples` batches of `q` uniform points are drawn
//!    on the manifold and scored with the unrefined acquisition function.
//! 2. **Seed selection**: `num_restarts` batches are kept: the best-scoring
//!    ones, or a Boltzmann draw over standardized scores that always keeps
//!    the raw maximum.
//! 3. **Refinement**: every member of every kept batch is refined with
//!    [`CandidateRefiner`]. Restarts share no mutable state; with the
//!    `parallel` feature they run on the rayon pool.
//! 4. **Selection**: the batch with the highest joint score wins; ties go to
//!    the earliest seed.
//!
//! Because the raw maximum is always refined and refinement never lowers a
//! score, the returned score is at least the best raw score.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionObjective;
use crate::error::{Error, Result};
use crate::manifold::Manifold;
use crate::refine::{CandidateRefiner, MANIFOLD_TOLERANCE, RefinedCandidate, RefinerConfig};
use crate::sampler::ManifoldPointSampler;
use crate::types::Direction;

/// How restart seeds are chosen among the raw samples.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SeedSelection {
    /// Keep the highest raw scores.
    #[default]
    Best,
    /// Sample with weights `exp(eta * z)` over standardized raw scores.
    Boltzmann {
        /// Inverse temperature; larger values approach [`SeedSelection::Best`].
        eta: f64,
    },
}

/// Settings of one acquisition-optimization call.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MultiRestartConfig {
    /// Number of refined restarts.
    pub num_restarts: usize,
    /// Number of raw batches scored before selection.
    pub raw_samples: usize,
    /// Points per batch.
    pub q: usize,
    /// Restart seed policy.
    pub selection: SeedSelection,
    /// Local refinement settings.
    pub refiner: RefinerConfig,
}

impl Default for MultiRestartConfig {
    fn default() -> Self {
        Self {
            num_restarts: 5,
            raw_samples: 100,
            q: 1,
            selection: SeedSelection::Best,
            refiner: RefinerConfig::default(),
        }
    }
}

impl MultiRestartConfig {
    /// Checks counts and nested refiner settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.num_restarts == 0 {
            return Err(Error::InvalidConfig("num_restarts must be at least 1".into()));
        }
        if self.raw_samples == 0 {
            return Err(Error::InvalidConfig("raw_samples must be at least 1".into()));
        }
        if self.q == 0 {
            return Err(Error::InvalidConfig("q must be at least 1".into()));
        }
        if let SeedSelection::Boltzmann { eta } = self.selection
            && !(eta.is_finite() && eta >= 0.0)
        {
            return Err(Error::InvalidConfig(
                "boltzmann eta must be finite and non-negative".into(),
            ));
        }
        self.refiner.validate()
    }
}

/// Winning batch of one acquisition-optimization call.
#[derive(Clone, Debug, PartialEq)]
pub struct BatchOutcome {
    /// The `q` refined points, in ambient coordinates.
    pub points: Vec<Vec<f64>>,
    /// Joint acquisition score of `points`.
    pub score: f64,
    /// Best unrefined raw-batch score.
    pub raw_best_score: f64,
    /// Position of the winning batch among the refined restarts.
    pub restart_index: usize,
    /// Number of restarts actually refined.
    pub restarts: usize,
    /// Refinements run, `restarts * q`.
    pub refinements: usize,
    /// Refinements that stopped at the iteration cap.
    pub non_converged: usize,
}

/// Refined members of one restart batch.
struct RefinedBatch {
    members: Vec<RefinedCandidate>,
    score: f64,
}

/// Multi-start optimizer of an acquisition function over a manifold.
///
/// # Examples
///
/// ```
/// use manifold_bo::manifold::Sphere;
/// use manifold_bo::multistart::{MultiRestartConfig, MultiRestartOptimizer};
///
/// let sphere = Sphere::new(2).unwrap();
/// let config = MultiRestartConfig {
///     num_restarts: 4,
///     raw_samples: 32,
///     ..MultiRestartConfig::default()
/// };
/// let optimizer = MultiRestartOptimizer::new(&sphere, config);
/// let score = |x: &[f64]| -(x[0] - 1.0).powi(2) - x[1] * x[1] - x[2] * x[2];
/// let mut rng = fastrand::Rng::with_seed(7);
/// let outcome = optimizer.optimize(&score, &mut rng).unwrap();
/// assert!(outcome.score >= outcome.raw_best_score);
/// assert!((outcome.points[0][0] - 1.0).abs() < 1e-3);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MultiRestartOptimizer<'a> {
    manifold: &'a dyn Manifold,
    config: MultiRestartConfig,
}

impl<'a> MultiRestartOptimizer<'a> {
    /// Creates an optimizer over `manifold`.
    #[must_use]
    pub fn new(manifold: &'a dyn Manifold, config: MultiRestartConfig) -> Self {
        Self { manifold, config }
    }

    /// Settings of this optimizer.
    #[must_use]
    pub fn config(&self) -> &MultiRestartConfig {
        &self.config
    }

    /// Finds the batch of `q` points maximizing `objective`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for zero counts,
    /// [`Error::DegenerateCandidate`] if a selected seed or a refined
    /// candidate is NaN or off the manifold.
    pub fn optimize(
        &self,
        objective: &dyn AcquisitionObjective,
        rng: &mut fastrand::Rng,
    ) -> Result<BatchOutcome> {
        self.config.validate()?;

        let raw = ManifoldPointSampler::new(self.manifold).sample_batches(
            self.config.raw_samples,
            self.config.q,
            rng,
        )?;
        let raw_scores: Vec<f64> = raw.iter().map(|b| objective.batch_value(b)).collect();
        let raw_best_score = raw_scores
            .iter()
            .copied()
            .filter(|s| !s.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);

        let n_restarts = self.config.num_restarts.min(self.config.raw_samples);
        if n_restarts < self.config.num_restarts {
            trace_debug!(
                requested = self.config.num_restarts,
                used = n_restarts,
                "fewer raw samples than restarts"
            );
        }
        let selected = match self.config.selection {
            SeedSelection::Best => select_best(&raw_scores, n_restarts),
            SeedSelection::Boltzmann { eta } => select_boltzmann(&raw_scores, n_restarts, eta, rng),
        };

        for &i in &selected {
            let invalid = raw_scores[i].is_nan()
                || raw[i].iter().flatten().any(|x| !x.is_finite());
            if invalid {
                return Err(Error::DegenerateCandidate(format!(
                    "restart seed {i} is invalid (score {})",
                    raw_scores[i]
                )));
            }
        }

        let refined = self.refine_all(&raw, &selected, objective)?;

        let mut best: Option<(usize, f64)> = None;
        for (i, batch) in refined.iter().enumerate() {
            if batch.score.is_nan() {
                return Err(Error::DegenerateCandidate(format!(
                    "refined restart {i} has a NaN score"
                )));
            }
            if best.is_none_or(|(_, s)| batch.score > s) {
                best = Some((i, batch.score));
            }
        }
        let (restart_index, score) = best.ok_or(Error::Internal("no restart was refined"))?;

        let non_converged = refined
            .iter()
            .flat_map(|b| &b.members)
            .filter(|m| !m.converged)
            .count();
        let refinements = refined.iter().map(|b| b.members.len()).sum();

        let points: Vec<Vec<f64>> = refined
            .into_iter()
            .nth(restart_index)
            .ok_or(Error::Internal("winning restart missing"))?
            .members
            .into_iter()
            .map(|m| m.point)
            .collect();
        for point in &points {
            self.manifold
                .validate(point, MANIFOLD_TOLERANCE)
                .map_err(|e| Error::DegenerateCandidate(format!("refined candidate rejected: {e}")))?;
        }

        trace_debug!(
            restarts = selected.len(),
            raw_best_score,
            score,
            non_converged,
            "acquisition optimized"
        );

        Ok(BatchOutcome {
            points,
            score,
            raw_best_score,
            restart_index,
            restarts: selected.len(),
            refinements,
            non_converged,
        })
    }

    #[cfg(not(feature = "parallel"))]
    fn refine_all(
        &self,
        raw: &[Vec<Vec<f64>>],
        selected: &[usize],
        objective: &dyn AcquisitionObjective,
    ) -> Result<Vec<RefinedBatch>> {
        let refiner = self.refiner();
        selected
            .iter()
            .map(|&i| refine_batch(&refiner, &raw[i], objective))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn refine_all(
        &self,
        raw: &[Vec<Vec<f64>>],
        selected: &[usize],
        objective: &dyn AcquisitionObjective,
    ) -> Result<Vec<RefinedBatch>> {
        use rayon::prelude::*;

        let refiner = self.refiner();
        // Indexed parallel collect keeps seed order.
        let results: Vec<Result<RefinedBatch>> = selected
            .par_iter()
            .map(|&i| refine_batch(&refiner, &raw[i], objective))
            .collect();
        results.into_iter().collect()
    }

    fn refiner(&self) -> CandidateRefiner<'a> {
        CandidateRefiner::new(self.manifold, self.config.refiner, Direction::Maximize)
    }
}

/// Refines every member of one restart batch and rescores it jointly.
fn refine_batch(
    refiner: &CandidateRefiner<'_>,
    seeds: &[Vec<f64>],
    objective: &dyn AcquisitionObjective,
) -> Result<RefinedBatch> {
    let members = seeds
        .iter()
        .map(|seed| refiner.refine(seed, objective))
        .collect::<Result<Vec<_>>>()?;
    let score = if members.len() == 1 {
        members[0].score
    } else {
        let points: Vec<Vec<f64>> = members.iter().map(|m| m.point.clone()).collect();
        objective.batch_value(&points)
    };
    Ok(RefinedBatch { members, score })
}

/// Sort key treating NaN as the largest score so a NaN is always selected
/// and then rejected.
fn selection_key(score: f64) -> f64 {
    if score.is_nan() { f64::INFINITY } else { score }
}

/// Indices of the `n` highest scores, earlier index first on ties.
fn select_best(scores: &[f64], n: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| selection_key(scores[b]).total_cmp(&selection_key(scores[a])));
    order.truncate(n);
    order
}

/// Boltzmann draw of `n` distinct indices that always contains the best one.
#[allow(clippy::cast_precision_loss)]
fn select_boltzmann(scores: &[f64], n: usize, eta: f64, rng: &mut fastrand::Rng) -> Vec<usize> {
    let best = select_best(scores, 1);
    if n <= 1 || scores.iter().any(|s| s.is_nan()) {
        return select_best(scores, n);
    }

    let finite: Vec<f64> = scores.iter().copied().filter(|s| s.is_finite()).collect();
    let mean = finite.iter().sum::<f64>() / finite.len().max(1) as f64;
    let var = finite.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / finite.len().max(1) as f64;
    let std = var.sqrt();

    let mut weights: Vec<f64> = scores
        .iter()
        .map(|&s| {
            if !s.is_finite() {
                return 0.0;
            }
            let z = if std > 0.0 { (s - mean) / std } else { 0.0 };
            let w = (eta * z).exp();
            if w.is_finite() { w } else { f64::MAX }
        })
        .collect();

    let mut chosen = best;
    weights[chosen[0]] = 0.0;
    while chosen.len() < n {
        let total: f64 = weights.iter().sum();
        let pick = if total > 0.0 && total.is_finite() {
            let mut target = rng.f64() * total;
            let mut pick = None;
            for (i, &w) in weights.iter().enumerate() {
                if w <= 0.0 {
                    continue;
                }
                pick = Some(i);
                if target < w {
                    break;
                }
                target -= w;
            }
            pick
        } else {
            // Remaining weights vanished: fall back to score order.
            select_best(scores, scores.len())
                .into_iter()
                .find(|i| !chosen.contains(i))
        };
        let Some(i) = pick else { break };
        chosen.push(i);
        weights[i] = 0.0;
    }
    chosen
}
