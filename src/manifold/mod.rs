//! Manifold capability consumed by the sampler, the refiner and the loop.
//!
//! Points are always handled in ambient (embedding) coordinates. The
//! optimizer never touches the geometry directly: it only asks the
//! manifold to project an ambient vector onto a tangent space, to retract
//! a tangent step back onto the manifold and to draw uniform points.
//!
//! - [`sphere`] - The unit hypersphere `S^d` embedded in `R^(d+1)`

mod sphere;

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub use sphere::Sphere;

use crate::error::{Error, Result};

/// A smooth manifold embedded in Euclidean coordinates.
///
/// Implementations must be immutable for the life of a run; the loop shares
/// one instance across all iterations and, with the `parallel` feature,
/// across refinement threads.
pub trait Manifold: Send + Sync + fmt::Debug {
    /// Selector name of the manifold family.
    fn name(&self) -> &'static str;

    /// Intrinsic dimension.
    fn dimension(&self) -> usize;

    /// Number of ambient coordinates of a point.
    fn ambient_dimension(&self) -> usize;

    /// Orthogonal projection of an ambient `vector` onto the tangent space at `point`.
    fn project_to_tangent(&self, point: &[f64], vector: &[f64]) -> Vec<f64>;

    /// Move from `point` along `tangent` and land back on the manifold.
    fn retract(&self, point: &[f64], tangent: &[f64]) -> Vec<f64>;

    /// Draw `n` i.i.d. uniformly distributed points.
    fn sample_uniform(&self, n: usize, rng: &mut fastrand::Rng) -> Vec<Vec<f64>>;

    /// Absolute violation of the manifold constraint at `point`.
    fn constraint_residual(&self, point: &[f64]) -> f64;

    /// Geodesic distance between two points.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Riemannian inner product of two tangent vectors at `point`.
    ///
    /// Defaults to the ambient Euclidean inner product (the induced metric).
    fn inner(&self, _point: &[f64], u: &[f64], v: &[f64]) -> f64 {
        u.iter().zip(v).map(|(a, b)| a * b).sum()
    }

    /// Norm of a tangent vector at `point`.
    fn norm(&self, point: &[f64], v: &[f64]) -> f64 {
        self.inner(point, v, v).sqrt()
    }

    /// Whether `point` has the right shape, is finite, and satisfies the
    /// constraint within `tol`.
    fn contains(&self, point: &[f64], tol: f64) -> bool {
        point.len() == self.ambient_dimension()
            && point.iter().all(|x| x.is_finite())
            && self.constraint_residual(point) <= tol
    }

    /// Check shape and membership, reporting why a point is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] or [`Error::OffManifold`].
    fn validate(&self, point: &[f64], tol: f64) -> Result<()> {
        if point.len() != self.ambient_dimension() {
            return Err(Error::DimensionMismatch {
                expected: self.ambient_dimension(),
                got: point.len(),
            });
        }
        let residual = self.constraint_residual(point);
        if !(residual <= tol) {
            return Err(Error::OffManifold { residual });
        }
        Ok(())
    }
}

/// Closed set of manifold families that can be selected by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ManifoldKind {
    /// The unit hypersphere.
    #[default]
    Sphere,
}

impl ManifoldKind {
    /// Resolves a manifold family from its selector name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownManifold`] for any other name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "sphere" => Ok(ManifoldKind::Sphere),
            other => Err(Error::UnknownManifold(other.to_string())),
        }
    }

    /// Selector name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ManifoldKind::Sphere => "sphere",
        }
    }

    /// Instantiates the manifold with the given intrinsic dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `dimension` is zero.
    pub fn build(self, dimension: usize) -> Result<Arc<dyn Manifold>> {
        match self {
            ManifoldKind::Sphere => Ok(Arc::new(Sphere::new(dimension)?)),
        }
    }
}

impl FromStr for ManifoldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

impl fmt::Display for ManifoldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
