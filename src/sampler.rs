//! Uniform restart seeding on a manifold.

use crate::error::{Error, Result};
use crate::manifold::Manifold;

/// Draws i.i.d. uniform points on a manifold to seed multi-restart search.
///
/// The sampler owns no randomness: callers hand in the generator, which is
/// how the loop keeps every iteration reproducible from its seed.
///
/// # Examples
///
/// ```
/// use manifold_bo::manifold::Sphere;
/// use manifold_bo::sampler::ManifoldPointSampler;
///
/// let sphere = Sphere::new(2).unwrap();
/// let sampler = ManifoldPointSampler::new(&sphere);
/// let mut rng = fastrand::Rng::with_seed(42);
/// let points = sampler.sample(16, &mut rng).unwrap();
/// assert_eq!(points.len(), 16);
/// assert!(points.iter().all(|p| p.len() == 3));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct ManifoldPointSampler<'a> {
    manifold: &'a dyn Manifold,
}

impl<'a> ManifoldPointSampler<'a> {
    /// Creates a sampler over `manifold`.
    #[must_use]
    pub fn new(manifold: &'a dyn Manifold) -> Self {
        Self { manifold }
    }

    /// Returns `raw_samples` uniform points in ambient coordinates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if `raw_samples` is zero.
    pub fn sample(&self, raw_samples: usize, rng: &mut fastrand::Rng) -> Result<Vec<Vec<f64>>> {
        if raw_samples == 0 {
            return Err(Error::InvalidSampleCount);
        }
        Ok(self.manifold.sample_uniform(raw_samples, rng))
    }

    /// Returns `batches` groups of `q` uniform points each.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSampleCount`] if either count is zero.
    pub fn sample_batches(
        &self,
        batches: usize,
        q: usize,
        rng: &mut fastrand::Rng,
    ) -> Result<Vec<Vec<Vec<f64>>>> {
        if batches == 0 || q == 0 {
            return Err(Error::InvalidSampleCount);
        }
        let mut flat = self.sample(batches * q, rng)?.into_iter();
        Ok((0..batches)
            .map(|_| flat.by_ref().take(q).collect())
            .collect())
    }
}
