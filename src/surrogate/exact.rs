//! Exact Gaussian process surrogate.
//!
//! Targets are standardized (zero mean, unit variance) and a GP with a
//! **Matérn 5/2** kernel over ambient chordal distance is fitted via
//! Cholesky decomposition. Chordal distance keeps the kernel positive
//! definite on any embedded manifold. The lengthscale defaults to the
//! median pairwise distance of the training inputs.

use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use super::{
    Posterior, Prediction, Standardizer, Surrogate, SurrogateFamily, euclidean_distance,
    median_pairwise_distance,
};
use crate::error::{Error, Result};
use crate::observation::ObservationSet;

/// Default observation noise variance on standardized targets.
const DEFAULT_NOISE_VAR: f64 = 1e-6;
/// Lengthscale used before two distinct points are available.
const FALLBACK_LENGTHSCALE: f64 = 1.0;
/// Lower clamp on the data-driven lengthscale.
const MIN_LENGTHSCALE: f64 = 0.05;
/// Cholesky attempts, each with ten times more diagonal jitter.
const CHOLESKY_MAX_TRIES: usize = 10;

/// Precomputed √5 constant.
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Exact GP regression over ambient coordinates.
///
/// Deterministic: [`Surrogate::resample_stochastic_state`] is a no-op.
///
/// # Examples
///
/// ```
/// use manifold_bo::surrogate::{ExactGp, Surrogate};
/// use manifold_bo::{Direction, ObservationSet};
///
/// let obs = ObservationSet::from_pairs(
///     Direction::Minimize,
///     vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0]],
///     vec![1.0, -1.0, 0.5],
/// )
/// .unwrap();
///
/// let mut gp = ExactGp::new();
/// gp.fit(&obs, 0, &mut fastrand::Rng::with_seed(0)).unwrap();
/// let posterior = gp.snapshot().unwrap();
/// let at_best = posterior.predict(&[0.0, 1.0]);
/// assert!((at_best.mean + 1.0).abs() < 1e-2);
/// ```
#[derive(Clone)]
pub struct ExactGp {
    noise_variance: f64,
    lengthscale: Option<f64>,
    fitted: Option<Arc<ExactPosterior>>,
}

impl ExactGp {
    /// Creates an unfitted GP with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            noise_variance: DEFAULT_NOISE_VAR,
            lengthscale: None,
            fitted: None,
        }
    }

    /// Sets the noise variance added to the kernel diagonal.
    ///
    /// Default: 1e-6 (near-noiseless).
    #[must_use]
    pub fn noise_variance(mut self, v: f64) -> Self {
        self.noise_variance = v;
        self
    }

    /// Fixes the kernel lengthscale instead of using the median heuristic.
    #[must_use]
    pub fn lengthscale(mut self, l: f64) -> Self {
        self.lengthscale = Some(l);
        self
    }
}

impl Default for ExactGp {
    fn default() -> Self {
        Self::new()
    }
}

/// A fitted exact GP ready for predictions.
struct ExactPosterior {
    /// Cholesky factor of K + σ²I.
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// α = (K + σ²I)^{-1} y.
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscale: f64,
    signal_var: f64,
    scale: Standardizer,
}

/// Matérn 5/2 kernel.
///
/// `k(r) = σ² (1 + √5 r + 5/3 r²) exp(-√5 r)` with `r = |x1 - x2| / l`.
fn matern52(x1: &[f64], x2: &[f64], lengthscale: f64, signal_var: f64) -> f64 {
    let r = euclidean_distance(x1, x2) / lengthscale;
    let sqrt5_r = SQRT_5 * r;
    signal_var * (1.0 + sqrt5_r + 5.0 / 3.0 * r * r) * (-sqrt5_r).exp()
}

fn kernel_vector(
    x_star: &[f64],
    x_train: &[Vec<f64>],
    lengthscale: f64,
    signal_var: f64,
) -> DVector<f64> {
    DVector::from_fn(x_train.len(), |i, _| {
        matern52(x_star, &x_train[i], lengthscale, signal_var)
    })
}

/// Factor `K + (σ² + jitter) I`, growing the jitter on failure.
fn factor_with_jitter(
    x: &[Vec<f64>],
    lengthscale: f64,
    signal_var: f64,
    noise_var: f64,
) -> Option<nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>> {
    let n = x.len();
    let base = DMatrix::from_fn(n, n, |i, j| matern52(&x[i], &x[j], lengthscale, signal_var));
    let mut jitter = 0.0;
    for _ in 0..CHOLESKY_MAX_TRIES {
        let mut k = base.clone();
        for i in 0..n {
            k[(i, i)] += noise_var + jitter;
        }
        if let Some(chol) = nalgebra::linalg::Cholesky::new(k) {
            return Some(chol);
        }
        jitter = if jitter == 0.0 { 1e-8 } else { jitter * 10.0 };
        trace_debug!(jitter, "cholesky failed, retrying with jitter");
    }
    None
}

impl Surrogate for ExactGp {
    fn family(&self) -> SurrogateFamily {
        SurrogateFamily::Exact
    }

    fn fit(
        &mut self,
        observations: &ObservationSet,
        _iteration: usize,
        _rng: &mut fastrand::Rng,
    ) -> Result<()> {
        if observations.is_empty() {
            return Err(Error::NoObservations);
        }
        let x_train = observations.points().to_vec();
        let scale = Standardizer::fit(observations.values());
        let y: Vec<f64> = observations
            .values()
            .iter()
            .map(|&v| scale.forward(v))
            .collect();

        let lengthscale = self.lengthscale.unwrap_or_else(|| {
            median_pairwise_distance(&x_train)
                .map_or(FALLBACK_LENGTHSCALE, |d| d.max(MIN_LENGTHSCALE))
        });
        // Signal variance = 1.0 (data is standardized)
        let signal_var = 1.0;

        let cholesky = factor_with_jitter(&x_train, lengthscale, signal_var, self.noise_variance)
            .ok_or_else(|| {
                Error::SurrogateFit(format!(
                    "kernel matrix of {} points is not positive definite",
                    x_train.len()
                ))
            })?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y));

        self.fitted = Some(Arc::new(ExactPosterior {
            cholesky,
            alpha,
            x_train,
            lengthscale,
            signal_var,
            scale,
        }));
        Ok(())
    }

    fn snapshot(&self) -> Result<Arc<dyn Posterior>> {
        let fitted = self.fitted.clone().ok_or(Error::NoObservations)?;
        Ok(fitted)
    }
}

impl Posterior for ExactPosterior {
    fn predict(&self, point: &[f64]) -> Prediction {
        let k_star = kernel_vector(point, &self.x_train, self.lengthscale, self.signal_var);

        // Mean: k*^T α
        let mean = k_star.dot(&self.alpha);

        // Variance: k(x*, x*) - k*^T (K + σ²I)^{-1} k*
        let v = self.cholesky.solve(&k_star);
        let var = (self.signal_var - k_star.dot(&v)).max(0.0);

        self.scale.inverse(mean, var.sqrt())
    }
}
