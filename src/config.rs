//! Run configuration and its builder.

use core::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionKind;
use crate::error::{Error, Result};
use crate::manifold::ManifoldKind;
use crate::multistart::{MultiRestartConfig, SeedSelection};
use crate::refine::RefinerConfig;
use crate::surrogate::{SurrogateFamily, SurrogateSchedule};
use crate::types::Direction;

/// Immutable settings of one optimization run.
///
/// Built with [`OptimizerConfig::builder()`] or, with the `serde` feature,
/// loaded from JSON via [`OptimizerConfig::from_json`]. Missing JSON fields
/// take the defaults listed on [`OptimizerConfigBuilder`].
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OptimizerConfig {
    /// Manifold family of the search domain.
    pub manifold: ManifoldKind,
    /// Intrinsic dimension of the manifold.
    pub dimension: usize,
    /// Number of loop iterations.
    pub num_iter: usize,
    /// Acquisition optimization settings.
    pub optimizer: MultiRestartConfig,
    /// Whether the objective is minimized or maximized.
    pub direction: Direction,
    /// Acquisition family.
    pub acquisition: AcquisitionKind,
    /// Surrogate family per iteration.
    pub schedule: SurrogateSchedule,
    /// Run-level seed; iteration generators are derived from it.
    pub seed: u64,
    /// Stop as converged once the best value reaches this.
    pub target_value: Option<f64>,
    /// Wall-clock budget checked between iterations.
    pub time_budget: Option<Duration>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            manifold: ManifoldKind::Sphere,
            dimension: 2,
            num_iter: 200,
            optimizer: MultiRestartConfig::default(),
            direction: Direction::Minimize,
            acquisition: AcquisitionKind::LogExpectedImprovement,
            schedule: SurrogateSchedule::default(),
            seed: 0,
            target_value: None,
            time_budget: None,
        }
    }
}

impl OptimizerConfig {
    /// Returns a builder with default settings.
    #[must_use]
    pub fn builder() -> OptimizerConfigBuilder {
        OptimizerConfigBuilder::default()
    }

    /// Checks that all counts and tolerances are usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::InvalidConfig("dimension must be at least 1".into()));
        }
        if let Some(target) = self.target_value
            && !target.is_finite()
        {
            return Err(Error::InvalidConfig(format!(
                "target_value must be finite, got {target}"
            )));
        }
        self.optimizer.validate()
    }

    /// Parses and validates a JSON document.
    ///
    /// Enum fields use their selector names (`"sphere"`,
    /// `"log_expected_improvement"`, `"exact"`, ...).
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownManifold`], [`Error::UnknownAcquisition`] or
    /// [`Error::UnknownSurrogate`] for an unrecognized selector name, the
    /// same errors the builder reports. Returns [`Error::InvalidConfig`] if
    /// the document does not parse or the result fails
    /// [`validate`](Self::validate).
    ///
    /// # Examples
    ///
    /// ```
    /// use manifold_bo::OptimizerConfig;
    ///
    /// let config = OptimizerConfig::from_json(
    ///     r#"{ "dimension": 3, "num_iter": 20, "acquisition": "expected_improvement" }"#,
    /// )
    /// .unwrap();
    /// assert_eq!(config.dimension, 3);
    /// assert_eq!(config.optimizer.num_restarts, 5);
    /// ```
    #[cfg(feature = "serde")]
    pub fn from_json(json: &str) -> Result<Self> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        resolve_selectors(&value)?;
        let config: Self =
            serde_json::from_value(value).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if serialization fails.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|_| Error::Internal("config serialization"))
    }
}

/// Checks selector names before typed deserialization so that unknown names
/// surface as the same errors the builder returns.
#[cfg(feature = "serde")]
fn resolve_selectors(value: &serde_json::Value) -> Result<()> {
    if let Some(name) = value.get("manifold").and_then(serde_json::Value::as_str) {
        ManifoldKind::from_name(name)?;
    }
    if let Some(name) = value.get("acquisition").and_then(serde_json::Value::as_str) {
        AcquisitionKind::from_name(name)?;
    }
    if let Some(schedule) = value.get("schedule") {
        if let Some(name) = schedule.get("initial").and_then(serde_json::Value::as_str) {
            SurrogateFamily::from_name(name)?;
        }
        if let Some(name) = schedule
            .get("switch")
            .and_then(|s| s.get(1))
            .and_then(serde_json::Value::as_str)
        {
            SurrogateFamily::from_name(name)?;
        }
    }
    Ok(())
}

/// Fluent builder for [`OptimizerConfig`].
///
/// # Defaults
///
/// - Manifold: 2-sphere
/// - Iterations: 200
/// - Restarts / raw samples / q: 5 / 100 / 1
/// - Direction: [`Minimize`](Direction::Minimize)
/// - Acquisition: [`LogExpectedImprovement`](AcquisitionKind::LogExpectedImprovement)
/// - Surrogate: [`Exact`](SurrogateFamily::Exact) throughout
/// - Refiner: 100 iterations, silent
///
/// # Examples
///
/// ```
/// use manifold_bo::prelude::*;
///
/// let config = OptimizerConfig::builder()
///     .manifold("sphere")
///     .dimension(1)
///     .num_iter(10)
///     .num_restarts(4)
///     .raw_samples(64)
///     .maximize()
///     .surrogate_switch(SurrogateFamily::Exact, 5, SurrogateFamily::Approximate)
///     .build()
///     .unwrap();
///
/// assert_eq!(config.direction, Direction::Maximize);
/// assert_eq!(config.schedule.family_at(5), SurrogateFamily::Approximate);
/// ```
#[derive(Clone, Debug, Default)]
pub struct OptimizerConfigBuilder {
    manifold: Option<ManifoldKind>,
    manifold_name: Option<String>,
    dimension: Option<usize>,
    num_iter: Option<usize>,
    num_restarts: Option<usize>,
    raw_samples: Option<usize>,
    q: Option<usize>,
    selection: Option<SeedSelection>,
    refiner: Option<RefinerConfig>,
    max_iterations: Option<usize>,
    verbosity: Option<u8>,
    direction: Option<Direction>,
    acquisition: Option<AcquisitionKind>,
    acquisition_name: Option<String>,
    schedule: Option<SurrogateSchedule>,
    seed: Option<u64>,
    target_value: Option<f64>,
    time_budget: Option<Duration>,
}

impl OptimizerConfigBuilder {
    /// Manifold family by selector name, resolved in [`build`](Self::build).
    #[must_use]
    pub fn manifold(mut self, name: &str) -> Self {
        self.manifold_name = Some(name.to_owned());
        self
    }

    /// Manifold family.
    #[must_use]
    pub fn manifold_kind(mut self, kind: ManifoldKind) -> Self {
        self.manifold = Some(kind);
        self.manifold_name = None;
        self
    }

    /// Intrinsic manifold dimension.
    #[must_use]
    pub fn dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    /// Number of loop iterations.
    #[must_use]
    pub fn num_iter(mut self, n: usize) -> Self {
        self.num_iter = Some(n);
        self
    }

    /// Number of refined restarts per acquisition optimization.
    #[must_use]
    pub fn num_restarts(mut self, n: usize) -> Self {
        self.num_restarts = Some(n);
        self
    }

    /// Number of raw samples scored before restart selection.
    #[must_use]
    pub fn raw_samples(mut self, n: usize) -> Self {
        self.raw_samples = Some(n);
        self
    }

    /// Points proposed per iteration.
    #[must_use]
    pub fn q(mut self, q: usize) -> Self {
        self.q = Some(q);
        self
    }

    /// Restart seed policy.
    #[must_use]
    pub fn seed_selection(mut self, selection: SeedSelection) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Complete refiner settings.
    ///
    /// [`max_iterations`](Self::max_iterations) and
    /// [`verbosity`](Self::verbosity) still override their fields.
    #[must_use]
    pub fn refiner(mut self, refiner: RefinerConfig) -> Self {
        self.refiner = Some(refiner);
        self
    }

    /// Iteration cap of each local refinement.
    #[must_use]
    pub fn max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = Some(n);
        self
    }

    /// Refiner verbosity.
    #[must_use]
    pub fn verbosity(mut self, level: u8) -> Self {
        self.verbosity = Some(level);
        self
    }

    /// Minimize the objective (the default).
    #[must_use]
    pub fn minimize(mut self) -> Self {
        self.direction = Some(Direction::Minimize);
        self
    }

    /// Maximize the objective.
    #[must_use]
    pub fn maximize(mut self) -> Self {
        self.direction = Some(Direction::Maximize);
        self
    }

    /// Optimization direction explicitly.
    #[must_use]
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Acquisition family.
    #[must_use]
    pub fn acquisition(mut self, kind: AcquisitionKind) -> Self {
        self.acquisition = Some(kind);
        self.acquisition_name = None;
        self
    }

    /// Acquisition family by selector name, resolved in [`build`](Self::build).
    #[must_use]
    pub fn acquisition_name(mut self, name: &str) -> Self {
        self.acquisition_name = Some(name.to_owned());
        self
    }

    /// Use one surrogate family for the whole run.
    #[must_use]
    pub fn surrogate(mut self, family: SurrogateFamily) -> Self {
        self.schedule = Some(SurrogateSchedule::fixed(family));
        self
    }

    /// Start on `initial` and use `target` from iteration `at` onward.
    #[must_use]
    pub fn surrogate_switch(
        mut self,
        initial: SurrogateFamily,
        at: usize,
        target: SurrogateFamily,
    ) -> Self {
        self.schedule = Some(SurrogateSchedule::switching(initial, at, target));
        self
    }

    /// Run-level random seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Stop as converged once the best value reaches `target`.
    #[must_use]
    pub fn target_value(mut self, target: f64) -> Self {
        self.target_value = Some(target);
        self
    }

    /// Wall-clock budget checked between iterations.
    #[must_use]
    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    /// Resolves names, applies defaults and validates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownManifold`] or [`Error::UnknownAcquisition`]
    /// for unknown selector names and [`Error::InvalidConfig`] for values
    /// out of range.
    pub fn build(self) -> Result<OptimizerConfig> {
        let defaults = OptimizerConfig::default();

        let manifold = match self.manifold_name {
            Some(name) => ManifoldKind::from_name(&name)?,
            None => self.manifold.unwrap_or(defaults.manifold),
        };
        let acquisition = match self.acquisition_name {
            Some(name) => AcquisitionKind::from_name(&name)?,
            None => self.acquisition.unwrap_or(defaults.acquisition),
        };

        let mut refiner = self.refiner.unwrap_or(defaults.optimizer.refiner);
        if let Some(n) = self.max_iterations {
            refiner.max_iterations = n;
        }
        if let Some(v) = self.verbosity {
            refiner.verbosity = v;
        }

        let config = OptimizerConfig {
            manifold,
            dimension: self.dimension.unwrap_or(defaults.dimension),
            num_iter: self.num_iter.unwrap_or(defaults.num_iter),
            optimizer: MultiRestartConfig {
                num_restarts: self.num_restarts.unwrap_or(defaults.optimizer.num_restarts),
                raw_samples: self.raw_samples.unwrap_or(defaults.optimizer.raw_samples),
                q: self.q.unwrap_or(defaults.optimizer.q),
                selection: self.selection.unwrap_or(defaults.optimizer.selection),
                refiner,
            },
            direction: self.direction.unwrap_or(defaults.direction),
            acquisition,
            schedule: self.schedule.unwrap_or(defaults.schedule),
            seed: self.seed.unwrap_or(defaults.seed),
            target_value: self.target_value,
            time_budget: self.time_budget,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_documented_values() {
        let config = OptimizerConfig::builder().build().unwrap();
        assert_eq!(config.num_iter, 200);
        assert_eq!(config.optimizer.num_restarts, 5);
        assert_eq!(config.optimizer.raw_samples, 100);
        assert_eq!(config.optimizer.q, 1);
        assert_eq!(config.optimizer.refiner.max_iterations, 100);
        assert_eq!(config.direction, Direction::Minimize);
        assert_eq!(config.acquisition, AcquisitionKind::LogExpectedImprovement);
        assert_eq!(config, OptimizerConfig::default());
    }

    #[test]
    fn unknown_names_are_configuration_errors() {
        let err = OptimizerConfig::builder().manifold("torus").build().unwrap_err();
        assert!(matches!(err, Error::UnknownManifold(_)));
        assert!(err.is_configuration());

        let err = OptimizerConfig::builder()
            .acquisition_name("probability_of_improvement")
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::UnknownAcquisition(_)));
    }

    #[test]
    fn refiner_overrides_apply_on_top_of_refiner_config() {
        let config = OptimizerConfig::builder()
            .refiner(RefinerConfig {
                contraction: 0.3,
                ..RefinerConfig::default()
            })
            .max_iterations(7)
            .verbosity(2)
            .build()
            .unwrap();
        assert_eq!(config.optimizer.refiner.max_iterations, 7);
        assert_eq!(config.optimizer.refiner.verbosity, 2);
        assert!((config.optimizer.refiner.contraction - 0.3).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(OptimizerConfig::builder().dimension(0).build().is_err());
        assert!(OptimizerConfig::builder().raw_samples(0).build().is_err());
        assert!(OptimizerConfig::builder().num_restarts(0).build().is_err());
        assert!(
            OptimizerConfig::builder()
                .target_value(f64::NAN)
                .build()
                .is_err()
        );
    }
}
