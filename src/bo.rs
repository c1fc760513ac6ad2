//! The Bayesian optimization loop.
//!
//! [`BayesOptLoop`] owns the observation history and drives one iteration
//! at a time:
//!
//! 1. pick the surrogate family for the iteration from the schedule,
//! 2. fit it to every observation,
//! 3. resample its stochastic state once and take a frozen snapshot,
//! 4. build the acquisition function over the best value at the start of
//!    the iteration,
//! 5. optimize the acquisition on the manifold,
//! 6. evaluate the objective at the proposed point(s) and append them,
//! 7. log one metrics row.
//!
//! Each iteration draws its randomness from a generator seeded with
//! [`iteration_seed`]`(seed, iteration)`, so an iteration can be replayed
//! without running the ones before it.
//!
//! # Examples
//!
//! ```
//! use manifold_bo::prelude::*;
//!
//! let config = OptimizerConfig::builder()
//!     .dimension(1)
//!     .num_iter(3)
//!     .num_restarts(2)
//!     .raw_samples(16)
//!     .seed(11)
//!     .build()
//!     .unwrap();
//!
//! // Minimize the height on the unit circle.
//! let objective = |x: &[f64]| Ok::<_, Error>(x[1]);
//! let initial = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]];
//!
//! let mut bo = BayesOptLoop::new(config, DefaultSurrogates::new(), objective, initial).unwrap();
//! let report = bo.run();
//!
//! assert_eq!(report.status, LoopStatus::Exhausted);
//! assert_eq!(report.iterations, 3);
//! assert_eq!(bo.state().observations().len(), 6);
//! ```

use core::fmt;
use std::sync::Arc;
use std::time::Instant;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::acquisition::AcquisitionFunction;
use crate::config::OptimizerConfig;
use crate::error::{Error, Result};
use crate::logger::{Metrics, MetricsLogger, NullLogger};
use crate::manifold::Manifold;
use crate::multistart::{BatchOutcome, MultiRestartOptimizer};
use crate::observation::ObservationSet;
use crate::refine::MANIFOLD_TOLERANCE;
use crate::rng_util::iteration_seed;
use crate::surrogate::{SurrogateFamily, SurrogateProvider};
use crate::types::LoopStatus;

/// The expensive black-box function being optimized.
///
/// Implemented for every closure `Fn(&[f64]) -> Result<f64, E>` whose error
/// type implements [`Display`](fmt::Display). Points are given in ambient
/// coordinates.
pub trait Objective {
    /// The error type returned by [`evaluate`](Objective::evaluate).
    type Error: fmt::Display;

    /// Evaluates the objective at `point`.
    ///
    /// # Errors
    ///
    /// Any error; the loop stops with [`LoopStatus::Failed`] and keeps the
    /// observations committed so far.
    fn evaluate(&self, point: &[f64]) -> core::result::Result<f64, Self::Error>;
}

impl<F, E> Objective for F
where
    F: Fn(&[f64]) -> core::result::Result<f64, E>,
    E: fmt::Display,
{
    type Error = E;

    fn evaluate(&self, point: &[f64]) -> core::result::Result<f64, E> {
        self(point)
    }
}

/// Mutable record of a run.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoState {
    observations: ObservationSet,
    family: SurrogateFamily,
    iteration: usize,
    status: LoopStatus,
    non_converged_refinements: usize,
}

impl BoState {
    /// Every observation, initial data first.
    #[must_use]
    pub fn observations(&self) -> &ObservationSet {
        &self.observations
    }

    /// Surrogate family of the latest iteration.
    #[must_use]
    pub fn family(&self) -> SurrogateFamily {
        self.family
    }

    /// Number of completed iterations.
    #[must_use]
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// Current lifecycle status.
    #[must_use]
    pub fn status(&self) -> LoopStatus {
        self.status
    }

    /// Local refinements that stopped at their iteration cap, over the run.
    #[must_use]
    pub fn non_converged_refinements(&self) -> usize {
        self.non_converged_refinements
    }
}

/// Summary of a finished (or aborted) run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    /// Terminal status.
    pub status: LoopStatus,
    /// Completed iterations.
    pub iterations: usize,
    /// Best observed point.
    pub best_point: Option<Vec<f64>>,
    /// Best observed value.
    pub best_value: Option<f64>,
    /// Local refinements that stopped at their iteration cap.
    pub non_converged_refinements: usize,
    /// The error that aborted the run, if `status` is `Failed`.
    pub failure: Option<Error>,
}

/// Controller of one Bayesian optimization run.
///
/// `P` resolves surrogate families to surrogate instances, `O` is the
/// objective. See the [module documentation](self) for the iteration
/// protocol.
pub struct BayesOptLoop<P, O> {
    config: OptimizerConfig,
    manifold: Arc<dyn Manifold>,
    provider: P,
    objective: O,
    logger: Box<dyn MetricsLogger>,
    state: BoState,
    failure: Option<Error>,
    started: Option<Instant>,
}

impl<P, O> fmt::Debug for BayesOptLoop<P, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BayesOptLoop")
            .field("config", &self.config)
            .field("manifold", &self.manifold)
            .field("state", &self.state)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl<P: SurrogateProvider, O: Objective> BayesOptLoop<P, O> {
    /// Builds the manifold, evaluates `objective` at every initial point
    /// and returns a loop ready to iterate.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid `config`,
    /// [`Error::NoObservations`] if `initial_points` is empty,
    /// [`Error::DimensionMismatch`] or [`Error::OffManifold`] for an initial
    /// point outside the manifold, and [`Error::ObjectiveEvaluation`] or
    /// [`Error::NonFiniteObservation`] if an initial evaluation fails.
    pub fn new(
        config: OptimizerConfig,
        provider: P,
        objective: O,
        initial_points: Vec<Vec<f64>>,
    ) -> Result<Self> {
        config.validate()?;
        let manifold = config.manifold.build(config.dimension)?;
        if initial_points.is_empty() {
            return Err(Error::NoObservations);
        }

        trace_debug!(n = initial_points.len(), "evaluating initial points");
        let mut observations = ObservationSet::new(config.direction);
        for point in initial_points {
            manifold.validate(&point, MANIFOLD_TOLERANCE)?;
            let value = objective
                .evaluate(&point)
                .map_err(|e| Error::ObjectiveEvaluation(e.to_string()))?;
            observations.append(point, value)?;
        }

        Ok(Self::assemble(config, manifold, provider, objective, observations))
    }

    /// Starts from already evaluated observations.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid `config` or if the
    /// observation direction differs from the configured one,
    /// [`Error::NoObservations`] if `observations` is empty, and
    /// [`Error::DimensionMismatch`] or [`Error::OffManifold`] for a point
    /// outside the manifold.
    pub fn with_observations(
        config: OptimizerConfig,
        provider: P,
        objective: O,
        observations: ObservationSet,
    ) -> Result<Self> {
        config.validate()?;
        let manifold = config.manifold.build(config.dimension)?;
        if observations.is_empty() {
            return Err(Error::NoObservations);
        }
        if observations.direction() != config.direction {
            return Err(Error::InvalidConfig(format!(
                "observations are oriented {:?} but the run is {:?}",
                observations.direction(),
                config.direction
            )));
        }
        for point in observations.points() {
            manifold.validate(point, MANIFOLD_TOLERANCE)?;
        }

        Ok(Self::assemble(config, manifold, provider, objective, observations))
    }

    fn assemble(
        config: OptimizerConfig,
        manifold: Arc<dyn Manifold>,
        provider: P,
        objective: O,
        observations: ObservationSet,
    ) -> Self {
        let family = config.schedule.family_at(0);
        Self {
            config,
            manifold,
            provider,
            objective,
            logger: Box::new(NullLogger),
            state: BoState {
                observations,
                family,
                iteration: 0,
                status: LoopStatus::Iterating,
                non_converged_refinements: 0,
            },
            failure: None,
            started: None,
        }
    }

    /// Sends one metrics row per iteration to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: impl MetricsLogger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// Run configuration.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// The search manifold.
    #[must_use]
    pub fn manifold(&self) -> &dyn Manifold {
        self.manifold.as_ref()
    }

    /// Current run state.
    #[must_use]
    pub fn state(&self) -> &BoState {
        &self.state
    }

    /// The surrogate provider.
    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// The error that aborted the run, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&Error> {
        self.failure.as_ref()
    }

    /// Consumes the loop and returns its final state.
    #[must_use]
    pub fn into_state(self) -> BoState {
        self.state
    }

    /// Runs one iteration unless the run is already over.
    ///
    /// Checks the time budget and target value first, then iterates, then
    /// re-checks termination.
    ///
    /// # Errors
    ///
    /// Returns the fatal error that moved the loop to
    /// [`LoopStatus::Failed`]. Later calls return `Ok(LoopStatus::Failed)`.
    pub fn step(&mut self) -> Result<LoopStatus> {
        if self.state.status.is_terminal() {
            return Ok(self.state.status);
        }
        let started = *self.started.get_or_insert_with(Instant::now);

        if let Some(status) = self.termination(started) {
            return Ok(self.finish(status));
        }

        match self.iterate() {
            Ok(_) => {
                self.state.iteration += 1;
                if let Some(status) = self.termination(started) {
                    return Ok(self.finish(status));
                }
                Ok(self.state.status)
            }
            Err(e) => {
                trace_info!(iteration = self.state.iteration, error = %e, "iteration failed");
                self.state.status = LoopStatus::Failed;
                self.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Iterates until the run converges, is exhausted, or fails.
    pub fn run(&mut self) -> RunReport {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!(
            "bayes_opt",
            num_iter = self.config.num_iter,
            manifold = %self.config.manifold,
            dimension = self.config.dimension,
            direction = ?self.config.direction,
        )
        .entered();

        while !self.state.status.is_terminal() {
            if self.step().is_err() {
                break;
            }
        }
        self.report()
    }

    /// Summary of the run so far.
    #[must_use]
    pub fn report(&self) -> RunReport {
        RunReport {
            status: self.state.status,
            iterations: self.state.iteration,
            best_point: self.state.observations.best_point().map(<[f64]>::to_vec),
            best_value: self.state.observations.best_value(),
            non_converged_refinements: self.state.non_converged_refinements,
            failure: self.failure.clone(),
        }
    }

    fn termination(&self, started: Instant) -> Option<LoopStatus> {
        if let (Some(target), Some(best)) =
            (self.config.target_value, self.state.observations.best_value())
            && self.config.direction.at_least_as_good(best, target)
        {
            return Some(LoopStatus::Converged);
        }
        if self.state.iteration >= self.config.num_iter {
            return Some(LoopStatus::Exhausted);
        }
        if let Some(budget) = self.config.time_budget
            && started.elapsed() >= budget
        {
            trace_info!(iteration = self.state.iteration, "time budget exhausted");
            return Some(LoopStatus::Exhausted);
        }
        None
    }

    fn finish(&mut self, status: LoopStatus) -> LoopStatus {
        self.state.status = status;
        trace_info!(
            status = ?status,
            iterations = self.state.iteration,
            best_value = self.state.observations.best_value(),
            "optimization finished"
        );
        status
    }

    /// One full iteration. Observations appended before an error stay.
    fn iterate(&mut self) -> Result<BatchOutcome> {
        let iteration = self.state.iteration;
        let mut rng = fastrand::Rng::with_seed(iteration_seed(self.config.seed, iteration));

        let family = self.config.schedule.family_at(iteration);
        if self.config.schedule.switches_at(iteration) {
            trace_info!(iteration, from = %self.state.family, to = %family, "surrogate family switched");
        }
        self.state.family = family;
        trace_debug!(iteration, family = %family, "iteration started");

        let best_f = self
            .state
            .observations
            .best_value()
            .ok_or(Error::NoObservations)?;

        let surrogate = self.provider.surrogate(family);
        if surrogate.family() != family {
            return Err(Error::UnknownSurrogate(format!(
                "provider returned a {} surrogate for {family}",
                surrogate.family()
            )));
        }
        surrogate.fit(&self.state.observations, iteration, &mut rng)?;
        // Held fixed for the rest of the iteration.
        surrogate.resample_stochastic_state(&mut rng);
        let posterior = surrogate.snapshot()?;

        let acquisition = AcquisitionFunction::new(
            self.config.acquisition,
            posterior,
            best_f,
            self.config.direction,
        );
        let optimizer = MultiRestartOptimizer::new(self.manifold.as_ref(), self.config.optimizer);
        let outcome = optimizer.optimize(&acquisition, &mut rng)?;

        if outcome.non_converged > 0 {
            trace_debug!(
                iteration,
                non_converged = outcome.non_converged,
                refinements = outcome.refinements,
                "refinements hit the iteration cap"
            );
        }
        self.state.non_converged_refinements += outcome.non_converged;

        let direction = self.config.direction;
        let mut candidate_value: Option<f64> = None;
        for point in &outcome.points {
            let value = self
                .objective
                .evaluate(point)
                .map_err(|e| Error::ObjectiveEvaluation(e.to_string()))?;
            if self.state.observations.append(point.clone(), value)? {
                trace_info!(iteration, value, "new best value found");
            }
            if candidate_value.is_none_or(|c| direction.improves(value, c)) {
                candidate_value = Some(value);
            }
        }

        self.log_iteration(iteration, &outcome, candidate_value);
        Ok(outcome)
    }

    fn log_iteration(&self, iteration: usize, outcome: &BatchOutcome, candidate_value: Option<f64>) {
        let obs = &self.state.observations;
        let mut metrics = Metrics::new()
            .with("iteration", iteration)
            .with("acquisition_value", outcome.score)
            .with("non_converged_refinements", self.state.non_converged_refinements);
        if let (Some(point), Some(value)) = (obs.best_point(), obs.best_value()) {
            metrics.insert("best_point", point);
            metrics.insert("best_value", value);
        }
        if let Some(value) = candidate_value {
            metrics.insert("candidate_value", value);
        }
        if let Err(e) = self.logger.log(&metrics) {
            trace_info!(iteration, error = %e, "metrics row dropped");
            #[cfg(not(feature = "tracing"))]
            let _ = e;
        }
    }
}
