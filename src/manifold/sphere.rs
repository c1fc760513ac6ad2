use super::Manifold;
use crate::error::{Error, Result};
use crate::rng_util;

/// Tangent steps shorter than this are retracted by renormalization.
const TINY_STEP: f64 = 1e-12;

/// The unit hypersphere `S^d = { x in R^(d+1) : |x| = 1 }`.
///
/// Retraction is the exponential map (moving along the great circle),
/// followed by a renormalization that absorbs floating-point drift, so every
/// retracted point satisfies `| |x| - 1 | <= 1e-12` for unit-norm inputs.
///
/// # Examples
///
/// ```
/// use manifold_bo::manifold::{Manifold, Sphere};
///
/// let circle = Sphere::new(1).unwrap();
/// let start = [1.0, 0.0];
/// let tangent = circle.project_to_tangent(&start, &[0.3, 0.7]);
/// let moved = circle.retract(&start, &tangent);
/// assert!(circle.contains(&moved, 1e-9));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sphere {
    dimension: usize,
}

impl Sphere {
    /// Creates the sphere of the given intrinsic dimension.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(Error::InvalidConfig(
                "sphere dimension must be at least 1".into(),
            ));
        }
        Ok(Self { dimension })
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn normalized(mut v: Vec<f64>) -> Vec<f64> {
    let norm = dot(&v, &v).sqrt();
    if norm > 0.0 && norm.is_finite() {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

impl Manifold for Sphere {
    fn name(&self) -> &'static str {
        "sphere"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn ambient_dimension(&self) -> usize {
        self.dimension + 1
    }

    fn project_to_tangent(&self, point: &[f64], vector: &[f64]) -> Vec<f64> {
        let radial = dot(point, vector);
        vector
            .iter()
            .zip(point)
            .map(|(v, x)| v - radial * x)
            .collect()
    }

    fn retract(&self, point: &[f64], tangent: &[f64]) -> Vec<f64> {
        let theta = dot(tangent, tangent).sqrt();
        if theta < TINY_STEP {
            return normalized(point.iter().zip(tangent).map(|(x, v)| x + v).collect());
        }
        let (sin, cos) = theta.sin_cos();
        normalized(
            point
                .iter()
                .zip(tangent)
                .map(|(x, v)| cos * x + sin * v / theta)
                .collect(),
        )
    }

    fn sample_uniform(&self, n: usize, rng: &mut fastrand::Rng) -> Vec<Vec<f64>> {
        let ambient = self.ambient_dimension();
        let mut points = Vec::with_capacity(n);
        while points.len() < n {
            let v: Vec<f64> = (0..ambient)
                .map(|_| rng_util::standard_normal(rng))
                .collect();
            // Isotropic Gaussian directions are uniform on the sphere; a
            // near-zero draw has no direction and is redrawn.
            if dot(&v, &v) > 1e-20 {
                points.push(normalized(v));
            }
        }
        points
    }

    fn constraint_residual(&self, point: &[f64]) -> f64 {
        (dot(point, point).sqrt() - 1.0).abs()
    }

    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        // Chord-based formula, accurate for both nearby and antipodal points.
        let chord: f64 = a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt();
        2.0 * (chord / 2.0).min(1.0).asin()
    }
}

#[cfg(test)]
mod tests {
    use core::f64::consts::{FRAC_PI_2, PI};

    use super::*;

    #[test]
    fn zero_dimension_is_rejected() {
        assert!(Sphere::new(0).is_err());
    }

    #[test]
    fn projection_is_orthogonal_to_point() {
        let s = Sphere::new(2).unwrap();
        let x = [0.0, 0.6, 0.8];
        let t = s.project_to_tangent(&x, &[1.0, 2.0, 3.0]);
        assert!(dot(&t, &x).abs() < 1e-12);
        // Projecting twice changes nothing.
        let t2 = s.project_to_tangent(&x, &t);
        for (a, b) in t.iter().zip(&t2) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn retraction_follows_great_circle() {
        let s = Sphere::new(1).unwrap();
        let moved = s.retract(&[1.0, 0.0], &[0.0, FRAC_PI_2]);
        assert!(moved[0].abs() < 1e-12);
        assert!((moved[1] - 1.0).abs() < 1e-12);
        assert!((s.distance(&[1.0, 0.0], &moved) - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn zero_step_is_identity() {
        let s = Sphere::new(2).unwrap();
        let x = [0.0, 0.6, 0.8];
        let y = s.retract(&x, &[0.0, 0.0, 0.0]);
        for (a, b) in x.iter().zip(&y) {
            assert!((a - b).abs() < 1e-15);
        }
    }

    #[test]
    fn retracted_points_stay_on_sphere() {
        let s = Sphere::new(4).unwrap();
        let mut rng = fastrand::Rng::with_seed(5);
        for x in s.sample_uniform(50, &mut rng) {
            let raw: Vec<f64> = (0..5).map(|_| rng_util::standard_normal(&mut rng) * 3.0).collect();
            let t = s.project_to_tangent(&x, &raw);
            let y = s.retract(&x, &t);
            assert!(s.contains(&y, 1e-6), "residual {}", s.constraint_residual(&y));
        }
    }

    #[test]
    fn distance_of_antipodes() {
        let s = Sphere::new(2).unwrap();
        let d = s.distance(&[0.0, 0.0, 1.0], &[0.0, 0.0, -1.0]);
        assert!((d - PI).abs() < 1e-12);
        assert_eq!(s.distance(&[0.0, 0.0, 1.0], &[0.0, 0.0, 1.0]), 0.0);
    }

    #[test]
    fn uniform_samples_have_zero_mean() {
        let s = Sphere::new(2).unwrap();
        let mut rng = fastrand::Rng::with_seed(3);
        let points = s.sample_uniform(4000, &mut rng);
        assert_eq!(points.len(), 4000);
        for axis in 0..3 {
            let mean = points.iter().map(|p| p[axis]).sum::<f64>() / 4000.0;
            assert!(mean.abs() < 0.05, "axis {axis} mean {mean}");
        }
        assert!(points.iter().all(|p| s.contains(p, 1e-12)));
    }
}
