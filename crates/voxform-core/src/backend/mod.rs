//! Array backends: one capability set, implemented for host and device memory.
//!
//! The pipeline is written once against [`ArrayBackend`] and instantiated
//! with exactly one implementation per run. Every array in flight has the
//! backend's associated `Array` type, so host and device arrays cannot be
//! mixed mid-pipeline.

pub mod host;

pub use host::HostBackend;
pub use ndarray::Axis;

use ndarray::Array3;

use crate::error::BackendError;

/// Numeric array operations used by the transform stages.
///
/// Reductions and percentiles must agree across implementations; both
/// compute exact order statistics and share [`PercentileRank`] for the
/// interpolation step.
pub trait ArrayBackend {
    /// Backend-resident 3D `f32` array.
    type Array;

    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Whether arrays live outside host memory.
    fn is_device(&self) -> bool;

    /// Move a host array into the backend.
    fn to_backend(&self, host: Array3<f32>) -> Result<Self::Array, BackendError>;

    /// Copy a backend array into host memory.
    fn to_host(&self, array: &Self::Array) -> Result<Array3<f32>, BackendError>;

    /// Consume a backend array and return it as an owned, standard-layout
    /// host array once all pending work on it has completed.
    fn normalize_to_host(&self, array: Self::Array) -> Result<Array3<f32>, BackendError>;

    /// Dimensions `(x, y, z)`.
    fn shape(&self, array: &Self::Array) -> [usize; 3];

    /// Clamp every element to `[low, high]`.
    fn clip(&self, array: Self::Array, low: f32, high: f32) -> Result<Self::Array, BackendError>;

    /// The `p`-th percentile (`0..=100`) with linear interpolation between
    /// closest ranks.
    fn percentile(&self, array: &Self::Array, p: f64) -> Result<f64, BackendError>;

    fn min(&self, array: &Self::Array) -> Result<f32, BackendError>;

    fn max(&self, array: &Self::Array) -> Result<f32, BackendError>;

    /// Tile the array `count` times along `axis`: output index `k` on that
    /// axis reads input index `k mod len`.
    fn repeat(
        &self,
        array: &Self::Array,
        count: usize,
        axis: Axis,
    ) -> Result<Self::Array, BackendError>;

    /// Map `[low, high]` onto `[0, 1]`. Elements `>= high` become exactly 1.
    fn rescale(&self, array: Self::Array, low: f32, high: f32)
    -> Result<Self::Array, BackendError>;

    /// Block until all submitted work has completed.
    fn synchronize(&self) -> Result<(), BackendError>;
}

/// Position of a percentile within a sorted array of `len` elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentileRank {
    /// Index of the lower order statistic.
    pub lower: usize,
    /// Index of the upper order statistic (`lower` or `lower + 1`).
    pub upper: usize,
    /// Weight of the upper statistic.
    pub fraction: f64,
}

impl PercentileRank {
    pub fn new(len: usize, p: f64) -> Result<Self, BackendError> {
        if len == 0 {
            return Err(BackendError::EmptyArray("percentile"));
        }
        if !(0.0..=100.0).contains(&p) {
            return Err(BackendError::InvalidArgument(format!(
                "percentile must be within [0, 100], got {p}"
            )));
        }
        let rank = p / 100.0 * (len - 1) as f64;
        let lower = rank.floor() as usize;
        let upper = (lower + 1).min(len - 1);
        Ok(Self {
            lower,
            upper,
            fraction: rank - lower as f64,
        })
    }

    /// Blend the two order statistics.
    pub fn interpolate(&self, lower_value: f32, upper_value: f32) -> f64 {
        let lo = lower_value as f64;
        let hi = upper_value as f64;
        lo + (hi - lo) * self.fraction
    }
}

/// Reject `low > high` or non-finite bounds.
pub fn check_bounds(op: &str, low: f32, high: f32) -> Result<(), BackendError> {
    if low.is_finite() && high.is_finite() && low <= high {
        Ok(())
    } else {
        Err(BackendError::InvalidArgument(format!(
            "{op} bounds must be finite with low <= high, got [{low}, {high}]"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_rank_matches_linear_interpolation() {
        // 11 elements: 5th percentile sits half way between index 0 and 1.
        let rank = PercentileRank::new(11, 5.0).unwrap();
        assert_eq!((rank.lower, rank.upper), (0, 1));
        assert!((rank.fraction - 0.5).abs() < 1e-12);
        assert!((rank.interpolate(10.0, 20.0) - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_rank_extremes() {
        let top = PercentileRank::new(4, 100.0).unwrap();
        assert_eq!((top.lower, top.upper), (3, 3));
        let single = PercentileRank::new(1, 42.0).unwrap();
        assert_eq!((single.lower, single.upper), (0, 0));
    }

    #[test]
    fn test_percentile_rank_rejects_bad_input() {
        assert!(matches!(
            PercentileRank::new(0, 5.0),
            Err(BackendError::EmptyArray(_))
        ));
        assert!(PercentileRank::new(10, 101.0).is_err());
        assert!(PercentileRank::new(10, f64::NAN).is_err());
    }
}
