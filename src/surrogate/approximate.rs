//! Random-feature Gaussian process with sampled weights.
//!
//! The RBF kernel is approximated with `D` random Fourier features
//! `φ(x) = sqrt(2/D) cos(ωᵀx / l + b)` and a Bayesian linear model is fitted
//! over the feature weights. Fitting is linear in the number of
//! observations, which makes this the cheap family for long runs.
//!
//! The model is stochastic: [`Surrogate::resample_stochastic_state`] draws
//! one weight vector from the weight posterior. Snapshots freeze the drawn
//! weights, so an acquisition function built on a snapshot sees a fixed
//! landscape for the whole multi-restart search.
//!
//! Random features are redrawn on a full refit (every `full_refit_every`
//! iterations, and whenever the input dimension changes); other
//! iterations reuse them and only update the weight posterior.

use core::f64::consts::TAU;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{
    Posterior, Prediction, Standardizer, Surrogate, SurrogateFamily, median_pairwise_distance,
};
use crate::error::{Error, Result};
use crate::observation::ObservationSet;
use crate::rng_util;

/// Default number of random Fourier features.
const DEFAULT_N_FEATURES: usize = 128;
/// Default noise variance on standardized targets.
const DEFAULT_NOISE_VAR: f64 = 1e-2;
/// Default full-refit cadence, in iterations.
const DEFAULT_FULL_REFIT_EVERY: usize = 5;
/// Lengthscale used before two distinct points are available.
const FALLBACK_LENGTHSCALE: f64 = 1.0;
/// Lower clamp on the data-driven lengthscale.
const MIN_LENGTHSCALE: f64 = 0.05;

/// Approximate GP surrogate built on random Fourier features.
///
/// # Examples
///
/// ```
/// use manifold_bo::surrogate::{RandomFeatureGp, Surrogate, SurrogateFamily};
///
/// let model = RandomFeatureGp::builder()
///     .n_features(64)
///     .noise_variance(1e-3)
///     .full_refit_every(10)
///     .build();
/// assert_eq!(model.family(), SurrogateFamily::Approximate);
/// ```
pub struct RandomFeatureGp {
    n_features: usize,
    noise_variance: f64,
    full_refit_every: usize,
    lengthscale: Option<f64>,
    features: Option<Arc<FourierFeatures>>,
    weights: Option<WeightPosterior>,
    sampled: Option<DVector<f64>>,
}

impl RandomFeatureGp {
    /// Creates a model with default settings.
    #[must_use]
    pub fn new() -> Self {
        RandomFeatureGpBuilder::new().build()
    }

    /// Creates a builder for configuring a `RandomFeatureGp`.
    #[must_use]
    pub fn builder() -> RandomFeatureGpBuilder {
        RandomFeatureGpBuilder::new()
    }

    /// Number of random features.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

impl Default for RandomFeatureGp {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for configuring a [`RandomFeatureGp`].
///
/// Defaults: 128 features, noise variance 1e-2, full refit every 5
/// iterations, median-distance lengthscale.
#[derive(Debug, Clone, Default)]
pub struct RandomFeatureGpBuilder {
    n_features: Option<usize>,
    noise_variance: Option<f64>,
    full_refit_every: Option<usize>,
    lengthscale: Option<f64>,
}

impl RandomFeatureGpBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of random Fourier features.
    #[must_use]
    pub fn n_features(mut self, n: usize) -> Self {
        self.n_features = Some(n);
        self
    }

    /// Sets the observation noise variance on standardized targets.
    #[must_use]
    pub fn noise_variance(mut self, v: f64) -> Self {
        self.noise_variance = Some(v);
        self
    }

    /// Redraw features every `n` iterations (`0` or `1` means every fit).
    #[must_use]
    pub fn full_refit_every(mut self, n: usize) -> Self {
        self.full_refit_every = Some(n);
        self
    }

    /// Fixes the kernel lengthscale.
    #[must_use]
    pub fn lengthscale(mut self, l: f64) -> Self {
        self.lengthscale = Some(l);
        self
    }

    /// Builds the configured [`RandomFeatureGp`].
    #[must_use]
    pub fn build(self) -> RandomFeatureGp {
        RandomFeatureGp {
            n_features: self.n_features.unwrap_or(DEFAULT_N_FEATURES).max(1),
            noise_variance: self.noise_variance.unwrap_or(DEFAULT_NOISE_VAR),
            full_refit_every: self
                .full_refit_every
                .unwrap_or(DEFAULT_FULL_REFIT_EVERY)
                .max(1),
            lengthscale: self.lengthscale,
            features: None,
            weights: None,
            sampled: None,
        }
    }
}

/// Frequencies and phases of the random features.
struct FourierFeatures {
    /// One row per feature, one column per ambient coordinate.
    omega: DMatrix<f64>,
    phase: Vec<f64>,
    lengthscale: f64,
}

impl FourierFeatures {
    fn draw(n_features: usize, dim: usize, lengthscale: f64, rng: &mut fastrand::Rng) -> Self {
        Self {
            omega: DMatrix::from_fn(n_features, dim, |_, _| rng_util::standard_normal(rng)),
            phase: (0..n_features)
                .map(|_| rng_util::f64_range(rng, 0.0, TAU))
                .collect(),
            lengthscale,
        }
    }

    fn input_dim(&self) -> usize {
        self.omega.ncols()
    }

    #[allow(clippy::cast_precision_loss)]
    fn map(&self, x: &[f64]) -> DVector<f64> {
        let d = self.phase.len();
        let amplitude = (2.0 / d as f64).sqrt();
        DVector::from_fn(d, |k, _| {
            let proj: f64 = x
                .iter()
                .enumerate()
                .map(|(j, xj)| self.omega[(k, j)] * xj)
                .sum();
            amplitude * (proj / self.lengthscale + self.phase[k]).cos()
        })
    }
}

/// Gaussian posterior over feature weights, `N(mean, A^{-1})`.
#[derive(Clone)]
struct WeightPosterior {
    /// Cholesky factor of the precision `A = ΦᵀΦ/σ² + I`.
    precision: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    mean: DVector<f64>,
    scale: Standardizer,
}

/// Frozen predictive state: features, weight posterior and one weight draw.
struct FeaturePosterior {
    features: Arc<FourierFeatures>,
    weights: WeightPosterior,
    sampled: DVector<f64>,
}

impl Posterior for FeaturePosterior {
    fn predict(&self, point: &[f64]) -> Prediction {
        let phi = self.features.map(point);
        let mean = phi.dot(&self.sampled);
        let var = phi.dot(&self.weights.precision.solve(&phi)).max(0.0);
        self.weights.scale.inverse(mean, var.sqrt())
    }
}

impl Surrogate for RandomFeatureGp {
    fn family(&self) -> SurrogateFamily {
        SurrogateFamily::Approximate
    }

    fn fit(
        &mut self,
        observations: &ObservationSet,
        iteration: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<()> {
        if observations.is_empty() {
            return Err(Error::NoObservations);
        }
        let points = observations.points();
        let dim = points[0].len();

        let full_refit = iteration % self.full_refit_every == 0
            || self
                .features
                .as_ref()
                .is_none_or(|f| f.input_dim() != dim);
        if full_refit {
            let lengthscale = self.lengthscale.unwrap_or_else(|| {
                median_pairwise_distance(points)
                    .map_or(FALLBACK_LENGTHSCALE, |d| d.max(MIN_LENGTHSCALE))
            });
            self.features = Some(Arc::new(FourierFeatures::draw(
                self.n_features,
                dim,
                lengthscale,
                rng,
            )));
            trace_debug!(iteration, lengthscale, "random features redrawn");
        }
        let features = self
            .features
            .as_ref()
            .ok_or(Error::Internal("features missing after refit"))?;

        let scale = Standardizer::fit(observations.values());
        let n = points.len();
        let d = self.n_features;
        let mut phi = DMatrix::<f64>::zeros(n, d);
        for (i, x) in points.iter().enumerate() {
            phi.set_row(i, &features.map(x).transpose());
        }
        let y = DVector::from_iterator(n, observations.values().iter().map(|&v| scale.forward(v)));

        let inv_noise = 1.0 / self.noise_variance.max(1e-12);
        let mut a = phi.tr_mul(&phi) * inv_noise;
        for k in 0..d {
            a[(k, k)] += 1.0;
        }
        let precision = nalgebra::linalg::Cholesky::new(a).ok_or_else(|| {
            Error::SurrogateFit("weight precision matrix is not positive definite".into())
        })?;
        let mean = precision.solve(&(phi.tr_mul(&y) * inv_noise));

        self.sampled = None;
        self.weights = Some(WeightPosterior {
            precision,
            mean,
            scale,
        });
        Ok(())
    }

    fn resample_stochastic_state(&mut self, rng: &mut fastrand::Rng) {
        let Some(weights) = &self.weights else {
            return;
        };
        // w = m + L^{-T} z has covariance (L Lᵀ)^{-1} = A^{-1}.
        let z = DVector::from_fn(weights.mean.len(), |_, _| rng_util::standard_normal(rng));
        let l_t = weights.precision.l().transpose();
        self.sampled = l_t
            .solve_upper_triangular(&z)
            .map(|offset| &weights.mean + offset);
    }

    fn snapshot(&self) -> Result<Arc<dyn Posterior>> {
        let (Some(features), Some(weights)) = (&self.features, &self.weights) else {
            return Err(Error::NoObservations);
        };
        let sampled = self.sampled.clone().unwrap_or_else(|| weights.mean.clone());
        Ok(Arc::new(FeaturePosterior {
            features: Arc::clone(features),
            weights: weights.clone(),
            sampled,
        }))
    }
}
