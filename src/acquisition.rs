//! Acquisition functions over a frozen surrogate posterior.
//!
//! An [`AcquisitionFunction`] closes over one [`Posterior`] snapshot and the
//! best value observed when the iteration started. It has no interior
//! state, so evaluating it twice at the same point gives the same score.
//! A new surrogate fit or a new stochastic draw means a new snapshot and
//! therefore a new acquisition function.
//!
//! Both families score the expected positive improvement over the
//! incumbent, oriented by the run's [`Direction`]:
//!
//! `EI(x) = σ h(u / σ)`, `h(z) = φ(z) + z Φ(z)`, `u = ±(μ(x) - f_best)`
//!
//! [`AcquisitionKind::LogExpectedImprovement`] returns `log EI` computed
//! without forming `EI`, so it stays finite and informative far from the
//! incumbent, where plain EI underflows to zero.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::surrogate::Posterior;
use crate::types::Direction;

/// Posterior standard deviations are floored here before scoring.
const MIN_STD: f64 = 1e-12;
/// Relative step of the central finite differences.
const FD_STEP: f64 = 1e-6;

/// Closed set of acquisition families that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum AcquisitionKind {
    /// Expected improvement.
    ExpectedImprovement,
    /// Logarithm of expected improvement, numerically stabilized.
    #[default]
    LogExpectedImprovement,
}

impl AcquisitionKind {
    /// Resolves an acquisition family from its selector name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownAcquisition`] for any other name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "expected_improvement" => Ok(AcquisitionKind::ExpectedImprovement),
            "log_expected_improvement" => Ok(AcquisitionKind::LogExpectedImprovement),
            other => Err(Error::UnknownAcquisition(other.to_string())),
        }
    }

    /// Selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            AcquisitionKind::ExpectedImprovement => "expected_improvement",
            AcquisitionKind::LogExpectedImprovement => "log_expected_improvement",
        }
    }
}

impl FromStr for AcquisitionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for AcquisitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar score over ambient-coordinate points, maximized by the
/// acquisition optimizer.
///
/// Implemented by [`AcquisitionFunction`] and by any
/// `Fn(&[f64]) -> f64 + Sync` closure, which is how tests and callers plug
/// in hand-written scores.
pub trait AcquisitionObjective: Sync {
    /// Score at `point`.
    fn value(&self, point: &[f64]) -> f64;

    /// Ambient gradient of [`value`](Self::value) at `point`.
    ///
    /// Defaults to central finite differences.
    fn gradient(&self, point: &[f64]) -> Vec<f64> {
        central_difference(|x| self.value(x), point)
    }

    /// Joint score of a `q`-batch: the best member score.
    fn batch_value(&self, points: &[Vec<f64>]) -> f64 {
        points
            .iter()
            .map(|p| self.value(p))
            .fold(f64::NEG_INFINITY, |acc, v| {
                if acc.is_nan() || v.is_nan() {
                    f64::NAN
                } else {
                    acc.max(v)
                }
            })
    }
}

impl<F> AcquisitionObjective for F
where
    F: Fn(&[f64]) -> f64 + Sync,
{
    fn value(&self, point: &[f64]) -> f64 {
        self(point)
    }
}

/// Central finite-difference gradient of `f` at `x`.
pub(crate) fn central_difference(f: impl Fn(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
    let mut probe = x.to_vec();
    (0..x.len())
        .map(|i| {
            let h = FD_STEP * x[i].abs().max(1.0);
            probe[i] = x[i] + h;
            let up = f(&probe);
            probe[i] = x[i] - h;
            let down = f(&probe);
            probe[i] = x[i];
            (up - down) / (2.0 * h)
        })
        .collect()
}

/// Improvement-based score closed over a posterior snapshot.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use manifold_bo::acquisition::{AcquisitionFunction, AcquisitionKind, AcquisitionObjective};
/// use manifold_bo::surrogate::{Posterior, Prediction};
/// use manifold_bo::Direction;
///
/// struct Flat;
/// impl Posterior for Flat {
///     fn predict(&self, _x: &[f64]) -> Prediction {
///         Prediction { mean: 0.0, std: 1.0 }
///     }
/// }
///
/// let ei = AcquisitionFunction::new(
///     AcquisitionKind::ExpectedImprovement,
///     Arc::new(Flat),
///     0.0,
///     Direction::Minimize,
/// );
/// // EI at zero improvement and unit std is φ(0).
/// assert!((ei.value(&[1.0, 0.0]) - 0.398_942_280_401_432_7).abs() < 1e-7);
/// ```
#[derive(Clone)]
pub struct AcquisitionFunction {
    kind: AcquisitionKind,
    posterior: Arc<dyn Posterior>,
    best_f: f64,
    direction: Direction,
}

impl AcquisitionFunction {
    /// Builds the acquisition function of `kind` over `posterior`.
    #[must_use]
    pub fn new(
        kind: AcquisitionKind,
        posterior: Arc<dyn Posterior>,
        best_f: f64,
        direction: Direction,
    ) -> Self {
        Self {
            kind,
            posterior,
            best_f,
            direction,
        }
    }

    /// Acquisition family.
    #[must_use]
    pub fn kind(&self) -> AcquisitionKind {
        self.kind
    }

    /// Incumbent value the improvement is measured against.
    #[must_use]
    pub fn best_f(&self) -> f64 {
        self.best_f
    }
}

impl fmt::Debug for AcquisitionFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquisitionFunction")
            .field("kind", &self.kind)
            .field("best_f", &self.best_f)
            .field("direction", &self.direction)
            .finish_non_exhaustive()
    }
}

impl AcquisitionObjective for AcquisitionFunction {
    fn value(&self, point: &[f64]) -> f64 {
        let prediction = self.posterior.predict(point);
        let improvement = self.direction.sign() * (prediction.mean - self.best_f);
        let std = prediction.std.max(MIN_STD);
        let z = improvement / std;
        match self.kind {
            AcquisitionKind::ExpectedImprovement => expected_improvement(z, std),
            AcquisitionKind::LogExpectedImprovement => log_h(z) + std.ln(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normal distribution helpers
// ---------------------------------------------------------------------------

const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
const LN_SQRT_2PI: f64 = 0.918_938_533_204_672_7;

/// Standard normal PDF.
pub(crate) fn norm_pdf(x: f64) -> f64 {
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Complementary error function (Chebyshev fit, fractional error < 1.2e-7).
pub(crate) fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let ans = t * (-z * z + erfc_poly(t)).exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

fn erfc_poly(t: f64) -> f64 {
    -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))))
}

/// Standard normal CDF.
pub(crate) fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / core::f64::consts::SQRT_2)
}

/// Mills ratio `Φ(-t) / φ(t)` for `t >= 0`, without forming either factor.
fn mills_ratio(t: f64) -> f64 {
    let tau = 1.0 / (1.0 + 0.5 * t / core::f64::consts::SQRT_2);
    0.5 * tau * erfc_poly(tau).exp() / INV_SQRT_2PI
}

/// `h(z) = φ(z) + z Φ(z)`.
fn h(z: f64) -> f64 {
    if z > -1.0 {
        norm_pdf(z) + z * norm_cdf(z)
    } else {
        log_h(z).exp()
    }
}

/// `ln h(z)`, finite for every finite `z`.
pub(crate) fn log_h(z: f64) -> f64 {
    if z > -1.0 {
        return (norm_pdf(z) + z * norm_cdf(z)).ln();
    }
    // h(-t) = φ(t) (1 - t R(t)); the bracket cancels badly for large t,
    // where its asymptotic series is used instead.
    let t = -z;
    let bracket = if t < 8.0 {
        1.0 - t * mills_ratio(t)
    } else {
        let inv2 = 1.0 / (t * t);
        inv2 * (1.0 - inv2 * (3.0 - inv2 * (15.0 - 105.0 * inv2)))
    };
    -0.5 * t * t - LN_SQRT_2PI + bracket.ln()
}

fn expected_improvement(z: f64, std: f64) -> f64 {
    (std * h(z)).max(0.0)
}
