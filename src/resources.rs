use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Amounts of each resource dimension, in a fixed dimension order shared by
/// every vector of an [`Instance`](crate::Instance).
///
/// Arithmetic between vectors of different dimensionality is a programming
/// error; [`Instance::new`](crate::Instance::new) rejects such instances so the
/// pipeline never mixes them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceVector(Vec<u64>);

impl ResourceVector {
    pub fn new(values: Vec<u64>) -> Self {
        Self(values)
    }

    pub fn zeros(dims: usize) -> Self {
        Self(vec![0; dims])
    }

    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, dimension: usize) -> u64 {
        self.0[dimension]
    }

    pub fn values(&self) -> &[u64] {
        &self.0
    }

    /// Component-wise `self <= capacity`.
    pub fn fits_within(&self, capacity: &ResourceVector) -> bool {
        self.first_exceeding(capacity).is_none()
    }

    /// The first dimension in which `self` is larger than `capacity`.
    pub fn first_exceeding(&self, capacity: &ResourceVector) -> Option<usize> {
        debug_assert_eq!(self.dims(), capacity.dims());
        self.0
            .iter()
            .zip(&capacity.0)
            .position(|(amount, limit)| amount > limit)
    }

    /// Whether `self + extra <= capacity` holds without materialising the sum.
    /// A sum that overflows `u64` does not fit.
    pub fn fits_with(&self, extra: &ResourceVector, capacity: &ResourceVector) -> bool {
        debug_assert_eq!(self.dims(), extra.dims());
        self.0
            .iter()
            .zip(&extra.0)
            .zip(&capacity.0)
            .all(|((used, more), limit)| used.checked_add(*more).is_some_and(|sum| sum <= *limit))
    }

    /// `self + rhs`, or `None` if any dimension overflows.
    pub fn checked_add(&self, rhs: &ResourceVector) -> Option<ResourceVector> {
        debug_assert_eq!(self.dims(), rhs.dims());
        self.0
            .iter()
            .zip(&rhs.0)
            .map(|(lhs, rhs)| lhs.checked_add(*rhs))
            .collect::<Option<Vec<_>>>()
            .map(Self)
    }
}

/// Saturates at `u64::MAX` in every dimension; use
/// [`ResourceVector::checked_add`] or [`ResourceVector::fits_with`] where an
/// overflow must be noticed.
impl Add for &ResourceVector {
    type Output = ResourceVector;

    fn add(self, rhs: &ResourceVector) -> ResourceVector {
        let mut sum = self.clone();
        sum += rhs;
        sum
    }
}

/// Saturates at zero in every dimension.
impl Sub for &ResourceVector {
    type Output = ResourceVector;

    fn sub(self, rhs: &ResourceVector) -> ResourceVector {
        let mut difference = self.clone();
        difference -= rhs;
        difference
    }
}

impl AddAssign<&ResourceVector> for ResourceVector {
    fn add_assign(&mut self, rhs: &ResourceVector) {
        debug_assert_eq!(self.dims(), rhs.dims());
        for (lhs, rhs) in self.0.iter_mut().zip(&rhs.0) {
            *lhs = lhs.saturating_add(*rhs);
        }
    }
}

impl SubAssign<&ResourceVector> for ResourceVector {
    fn sub_assign(&mut self, rhs: &ResourceVector) {
        debug_assert_eq!(self.dims(), rhs.dims());
        for (lhs, rhs) in self.0.iter_mut().zip(&rhs.0) {
            *lhs = lhs.saturating_sub(*rhs);
        }
    }
}

impl From<Vec<u64>> for ResourceVector {
    fn from(values: Vec<u64>) -> Self {
        Self(values)
    }
}

impl<const D: usize> From<[u64; D]> for ResourceVector {
    fn from(values: [u64; D]) -> Self {
        Self(values.to_vec())
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_within_is_component_wise() {
        let capacity = ResourceVector::from([256, 32, 100]);
        assert!(ResourceVector::from([256, 32, 100]).fits_within(&capacity));
        assert!(ResourceVector::from([0, 0, 0]).fits_within(&capacity));
        assert!(!ResourceVector::from([1, 33, 1]).fits_within(&capacity));
    }

    #[test]
    fn first_exceeding_reports_lowest_dimension() {
        let capacity = ResourceVector::from([1, 1, 1]);
        assert_eq!(ResourceVector::from([2, 2, 2]).first_exceeding(&capacity), Some(0));
        assert_eq!(ResourceVector::from([1, 1, 2]).first_exceeding(&capacity), Some(2));
        assert_eq!(ResourceVector::from([1, 1, 1]).first_exceeding(&capacity), None);
    }

    #[test]
    fn arithmetic() {
        let a = ResourceVector::from([8, 1, 10]);
        let b = ResourceVector::from([16, 4, 15]);
        assert_eq!(&a + &b, ResourceVector::from([24, 5, 25]));
        assert_eq!(&b - &a, ResourceVector::from([8, 3, 5]));
        assert_eq!(&a - &b, ResourceVector::zeros(3));
    }

    #[test]
    fn fits_with_checks_the_sum() {
        let capacity = ResourceVector::from([10, 10]);
        let used = ResourceVector::from([6, 2]);
        assert!(used.fits_with(&ResourceVector::from([4, 8]), &capacity));
        assert!(!used.fits_with(&ResourceVector::from([5, 0]), &capacity));
    }

    #[test]
    fn sums_past_u64_max_never_fit() {
        let capacity = ResourceVector::from([u64::MAX]);
        let half = ResourceVector::from([1u64 << 63]);
        assert!(!half.fits_with(&half, &capacity));
        assert_eq!(half.checked_add(&half), None);
        assert_eq!(&half + &half, capacity);
        assert_eq!(
            half.checked_add(&ResourceVector::from([1])),
            Some(ResourceVector::from([(1u64 << 63) + 1]))
        );
    }

    #[test]
    fn display() {
        assert_eq!(ResourceVector::from([8, 1, 10]).to_string(), "(8, 1, 10)");
    }
}
