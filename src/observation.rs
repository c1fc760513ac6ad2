//! Append-only observation history with incremental best tracking.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Direction;

/// Ordered `(point, value)` pairs observed so far.
///
/// The best point is maintained on every append: a new value replaces the
/// incumbent only when it is strictly better under the set's
/// [`Direction`], so ties keep the earliest observation.
///
/// # Examples
///
/// ```
/// use manifold_bo::{Direction, ObservationSet};
///
/// let mut obs = ObservationSet::new(Direction::Minimize);
/// obs.append(vec![1.0, 0.0], 1.0).unwrap();
/// obs.append(vec![0.0, 1.0], -1.0).unwrap();
/// obs.append(vec![-1.0, 0.0], -1.0).unwrap();
/// assert_eq!(obs.best_value(), Some(-1.0));
/// assert_eq!(obs.best_index(), Some(1));
/// ```
///
/// Deserialization replays the stored pairs through [`append`](Self::append),
/// so the best index is always recomputed rather than trusted.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "ObservationSetRepr"))]
pub struct ObservationSet {
    direction: Direction,
    points: Vec<Vec<f64>>,
    values: Vec<f64>,
    best: Option<usize>,
}

/// Stored form of an [`ObservationSet`]; any serialized `best` is ignored.
#[cfg(feature = "serde")]
#[derive(Deserialize)]
struct ObservationSetRepr {
    direction: Direction,
    points: Vec<Vec<f64>>,
    values: Vec<f64>,
}

#[cfg(feature = "serde")]
impl TryFrom<ObservationSetRepr> for ObservationSet {
    type Error = Error;

    fn try_from(repr: ObservationSetRepr) -> Result<Self> {
        Self::from_pairs(repr.direction, repr.points, repr.values)
    }
}

impl ObservationSet {
    /// Creates an empty set ranked by `direction`.
    #[must_use]
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            points: Vec::new(),
            values: Vec::new(),
            best: None,
        }
    }

    /// Builds a set from parallel point/value sequences.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the sequences differ in length
    /// or the points differ in dimension, and
    /// [`Error::NonFiniteObservation`] for a NaN or infinite value.
    pub fn from_pairs(
        direction: Direction,
        points: Vec<Vec<f64>>,
        values: Vec<f64>,
    ) -> Result<Self> {
        if points.len() != values.len() {
            return Err(Error::DimensionMismatch {
                expected: points.len(),
                got: values.len(),
            });
        }
        let mut set = Self::new(direction);
        for (point, value) in points.into_iter().zip(values) {
            set.append(point, value)?;
        }
        Ok(set)
    }

    /// Appends one observation and returns `true` if it became the new best.
    ///
    /// Nothing is stored when the observation is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonFiniteObservation`] for a NaN or infinite value,
    /// [`Error::DegenerateCandidate`] for a non-finite coordinate and
    /// [`Error::DimensionMismatch`] if the point's dimension differs from
    /// earlier points.
    pub fn append(&mut self, point: Vec<f64>, value: f64) -> Result<bool> {
        if !value.is_finite() {
            return Err(Error::NonFiniteObservation(value));
        }
        if point.iter().any(|x| !x.is_finite()) {
            return Err(Error::DegenerateCandidate(format!(
                "observed point {point:?} has non-finite coordinates"
            )));
        }
        if let Some(first) = self.points.first()
            && first.len() != point.len()
        {
            return Err(Error::DimensionMismatch {
                expected: first.len(),
                got: point.len(),
            });
        }

        self.points.push(point);
        self.values.push(value);
        let index = self.values.len() - 1;
        let improved = self
            .best
            .is_none_or(|b| self.direction.improves(value, self.values[b]));
        if improved {
            self.best = Some(index);
        }
        Ok(improved)
    }

    /// Direction used to rank observations.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of observations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether nothing has been observed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Observed points, in insertion order.
    #[must_use]
    pub fn points(&self) -> &[Vec<f64>] {
        &self.points
    }

    /// Observed values, in insertion order.
    #[must_use]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Iterates over `(point, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&[f64], f64)> {
        self.points
            .iter()
            .map(Vec::as_slice)
            .zip(self.values.iter().copied())
    }

    /// Index of the best observation (earliest on ties).
    #[must_use]
    pub fn best_index(&self) -> Option<usize> {
        self.best
    }

    /// Best observed value.
    #[must_use]
    pub fn best_value(&self) -> Option<f64> {
        self.best.map(|i| self.values[i])
    }

    /// Point at which the best value was observed.
    #[must_use]
    pub fn best_point(&self) -> Option<&[f64]> {
        self.best.map(|i| self.points[i].as_slice())
    }
}
