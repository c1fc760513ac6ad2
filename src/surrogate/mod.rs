//! Surrogate models and the schedule that picks a family per iteration.
//!
//! The loop only sees three capabilities: fit a surrogate to the
//! observations, optionally resample its stochastic state, and take an
//! immutable [`Posterior`] snapshot that acquisition functions close over.
//!
//! - [`exact`] - Exact Gaussian process with a Matérn 5/2 kernel
//! - [`approximate`] - Random-feature Gaussian process with sampled weights

mod approximate;
mod exact;

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use approximate::{RandomFeatureGp, RandomFeatureGpBuilder};
pub use exact::ExactGp;

use crate::error::{Error, Result};
use crate::observation::ObservationSet;

/// Predictive mean and standard deviation at one point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Prediction {
    /// Posterior predictive mean, in objective units.
    pub mean: f64,
    /// Posterior predictive standard deviation, in objective units.
    pub std: f64,
}

/// Frozen predictive distribution of a fitted surrogate.
///
/// A snapshot never changes after it is taken: refitting or resampling the
/// surrogate produces a new snapshot and leaves existing ones intact.
pub trait Posterior: Send + Sync {
    /// Predictive distribution at `point` (ambient coordinates).
    fn predict(&self, point: &[f64]) -> Prediction;
}

/// A probabilistic regression model that can be fitted to observations.
pub trait Surrogate: Send {
    /// Family this surrogate belongs to.
    fn family(&self) -> SurrogateFamily;

    /// Fit to every observation made so far.
    ///
    /// `iteration` lets families vary their fitting effort over a run;
    /// `rng` is the iteration's generator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoObservations`] for an empty set and
    /// [`Error::SurrogateFit`] when the model cannot be fitted.
    fn fit(
        &mut self,
        observations: &ObservationSet,
        iteration: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<()>;

    /// Redraw internal randomness. No-op for deterministic families.
    fn resample_stochastic_state(&mut self, _rng: &mut fastrand::Rng) {}

    /// Freeze the current predictive state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoObservations`] if the surrogate was never fitted.
    fn snapshot(&self) -> Result<Arc<dyn Posterior>>;
}

/// Resolves a family label to the surrogate instance that serves it.
pub trait SurrogateProvider {
    /// The surrogate to use for `family`.
    fn surrogate(&mut self, family: SurrogateFamily) -> &mut dyn Surrogate;
}

/// One surrogate of each built-in family, kept across iterations.
pub struct DefaultSurrogates {
    exact: ExactGp,
    approximate: RandomFeatureGp,
}

impl DefaultSurrogates {
    /// Default-configured surrogates of both families.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: ExactGp::new(),
            approximate: RandomFeatureGp::new(),
        }
    }

    /// Surrogates with custom configuration.
    #[must_use]
    pub fn with_models(exact: ExactGp, approximate: RandomFeatureGp) -> Self {
        Self { exact, approximate }
    }
}

impl Default for DefaultSurrogates {
    fn default() -> Self {
        Self::new()
    }
}

impl SurrogateProvider for DefaultSurrogates {
    fn surrogate(&mut self, family: SurrogateFamily) -> &mut dyn Surrogate {
        match family {
            SurrogateFamily::Exact => &mut self.exact,
            SurrogateFamily::Approximate => &mut self.approximate,
        }
    }
}

/// Closed set of surrogate families that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SurrogateFamily {
    /// Exact Gaussian process, deterministic, cubic fitting cost.
    #[default]
    Exact,
    /// Approximate stochastic model, linear fitting cost in the data.
    Approximate,
}

impl SurrogateFamily {
    /// Resolves a family from its selector name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownSurrogate`] for any other name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "exact" => Ok(SurrogateFamily::Exact),
            "approximate" => Ok(SurrogateFamily::Approximate),
            other => Err(Error::UnknownSurrogate(other.to_string())),
        }
    }

    /// Selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SurrogateFamily::Exact => "exact",
            SurrogateFamily::Approximate => "approximate",
        }
    }
}

impl FromStr for SurrogateFamily {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for SurrogateFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which surrogate family serves which iteration.
///
/// The choice depends only on the iteration index: iterations before
/// `switch_at` use `initial`, every later one uses the target family.
///
/// # Examples
///
/// ```
/// use manifold_bo::surrogate::{SurrogateFamily, SurrogateSchedule};
///
/// let schedule = SurrogateSchedule::switching(
///     SurrogateFamily::Exact,
///     3,
///     SurrogateFamily::Approximate,
/// );
/// assert_eq!(schedule.family_at(2), SurrogateFamily::Exact);
/// assert_eq!(schedule.family_at(3), SurrogateFamily::Approximate);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SurrogateSchedule {
    /// Family used from the first iteration.
    pub initial: SurrogateFamily,
    /// Iteration index and family of the switch, if any.
    pub switch: Option<(usize, SurrogateFamily)>,
}

impl SurrogateSchedule {
    /// A single family for the whole run.
    #[must_use]
    pub fn fixed(family: SurrogateFamily) -> Self {
        Self {
            initial: family,
            switch: None,
        }
    }

    /// Start on `initial`, use `target` from iteration `at` onward.
    #[must_use]
    pub fn switching(initial: SurrogateFamily, at: usize, target: SurrogateFamily) -> Self {
        Self {
            initial,
            switch: Some((at, target)),
        }
    }

    /// Family for iteration `iteration`.
    #[must_use]
    pub fn family_at(&self, iteration: usize) -> SurrogateFamily {
        match self.switch {
            Some((at, target)) if iteration >= at => target,
            _ => self.initial,
        }
    }

    /// Whether `iteration` is the first to use a different family than
    /// the one before it.
    #[must_use]
    pub fn switches_at(&self, iteration: usize) -> bool {
        iteration > 0 && self.family_at(iteration) != self.family_at(iteration - 1)
    }
}

/// Mean and standard deviation used to standardize targets.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Standardizer {
    pub(crate) mean: f64,
    pub(crate) std: f64,
}

impl Standardizer {
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn fit(values: &[f64]) -> Self {
        let n = values.len();
        let mean = values.iter().sum::<f64>() / n.max(1) as f64;
        let var = if n > 1 {
            values.iter().map(|&y| (y - mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        Self {
            mean,
            std: var.sqrt().max(1e-10),
        }
    }

    pub(crate) fn forward(&self, y: f64) -> f64 {
        (y - self.mean) / self.std
    }

    pub(crate) fn inverse(&self, mean: f64, std: f64) -> Prediction {
        Prediction {
            mean: mean * self.std + self.mean,
            std: std * self.std,
        }
    }
}

pub(crate) fn euclidean_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

/// Median of all pairwise ambient distances, `None` with fewer than two
/// distinct points.
pub(crate) fn median_pairwise_distance(points: &[Vec<f64>]) -> Option<f64> {
    let mut distances = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            let d = euclidean_distance(a, b);
            if d > 0.0 {
                distances.push(d);
            }
        }
    }
    if distances.is_empty() {
        return None;
    }
    distances.sort_by(f64::total_cmp);
    Some(distances[distances.len() / 2])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_switches_at_boundary() {
        let schedule =
            SurrogateSchedule::switching(SurrogateFamily::Exact, 3, SurrogateFamily::Approximate);
        let families: Vec<_> = (0..6).map(|i| schedule.family_at(i)).collect();
        assert_eq!(
            families,
            vec![
                SurrogateFamily::Exact,
                SurrogateFamily::Exact,
                SurrogateFamily::Exact,
                SurrogateFamily::Approximate,
                SurrogateFamily::Approximate,
                SurrogateFamily::Approximate,
            ]
        );
        assert!(schedule.switches_at(3));
        assert!(!schedule.switches_at(4));
        assert!(!schedule.switches_at(0));
    }

    #[test]
    fn switch_at_zero_uses_target_throughout() {
        let schedule =
            SurrogateSchedule::switching(SurrogateFamily::Exact, 0, SurrogateFamily::Approximate);
        assert_eq!(schedule.family_at(0), SurrogateFamily::Approximate);
        assert!(!schedule.switches_at(1));
    }

    #[test]
    fn fixed_schedule_never_switches() {
        let schedule = SurrogateSchedule::fixed(SurrogateFamily::Approximate);
        assert!((0..100).all(|i| schedule.family_at(i) == SurrogateFamily::Approximate));
    }

    #[test]
    fn family_names_round_trip() {
        for family in [SurrogateFamily::Exact, SurrogateFamily::Approximate] {
            assert_eq!(SurrogateFamily::from_name(family.name()).unwrap(), family);
        }
        assert_eq!(
            "deep".parse::<SurrogateFamily>().unwrap_err(),
            Error::UnknownSurrogate("deep".into())
        );
    }

    #[test]
    fn standardizer_inverts() {
        let s = Standardizer::fit(&[1.0, 2.0, 3.0, 4.0]);
        let p = s.inverse(s.forward(3.5), 1.0);
        assert!((p.mean - 3.5).abs() < 1e-12);
        assert!((p.std - s.std).abs() < 1e-12);
        let single = Standardizer::fit(&[7.0]);
        assert!((single.mean - 7.0).abs() < 1e-12);
        assert!((single.std - 1.0).abs() < 1e-12);
    }

    #[test]
    fn median_distance_ignores_duplicates() {
        let pts = vec![vec![0.0, 0.0], vec![0.0, 0.0], vec![3.0, 4.0]];
        assert_eq!(median_pairwise_distance(&pts), Some(5.0));
        assert_eq!(median_pairwise_distance(&pts[..2]), None);
    }
}
