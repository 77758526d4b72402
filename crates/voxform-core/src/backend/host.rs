//! Host-memory backend over `ndarray`.

use ndarray::{Array3, ArrayView3, Axis};

use super::{ArrayBackend, PercentileRank, check_bounds};
use crate::error::BackendError;

/// Runs every operation on the CPU, in host memory.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }
}

impl ArrayBackend for HostBackend {
    type Array = Array3<f32>;

    fn name(&self) -> &'static str {
        "host"
    }

    fn is_device(&self) -> bool {
        false
    }

    fn to_backend(&self, host: Array3<f32>) -> Result<Self::Array, BackendError> {
        Ok(host)
    }

    fn to_host(&self, array: &Self::Array) -> Result<Array3<f32>, BackendError> {
        Ok(array.clone())
    }

    fn normalize_to_host(&self, array: Self::Array) -> Result<Array3<f32>, BackendError> {
        if array.is_standard_layout() {
            Ok(array)
        } else {
            Ok(array.as_standard_layout().into_owned())
        }
    }

    fn shape(&self, array: &Self::Array) -> [usize; 3] {
        array.dim().into()
    }

    fn clip(&self, mut array: Self::Array, low: f32, high: f32) -> Result<Self::Array, BackendError> {
        check_bounds("clip", low, high)?;
        array.mapv_inplace(|v| v.max(low).min(high));
        Ok(array)
    }

    fn percentile(&self, array: &Self::Array, p: f64) -> Result<f64, BackendError> {
        let rank = PercentileRank::new(array.len(), p)?;
        let mut values: Vec<f32> = array.iter().copied().collect();
        let (_, lower, above) = values.select_nth_unstable_by(rank.lower, f32::total_cmp);
        let lower = *lower;
        let upper = if rank.upper == rank.lower {
            lower
        } else {
            // Everything after the pivot is >= it; the next order statistic
            // is the smallest of them.
            above.iter().copied().min_by(f32::total_cmp).unwrap_or(lower)
        };
        Ok(rank.interpolate(lower, upper))
    }

    fn min(&self, array: &Self::Array) -> Result<f32, BackendError> {
        array
            .iter()
            .copied()
            .reduce(f32::min)
            .ok_or(BackendError::EmptyArray("min"))
    }

    fn max(&self, array: &Self::Array) -> Result<f32, BackendError> {
        array
            .iter()
            .copied()
            .reduce(f32::max)
            .ok_or(BackendError::EmptyArray("max"))
    }

    fn repeat(
        &self,
        array: &Self::Array,
        count: usize,
        axis: Axis,
    ) -> Result<Self::Array, BackendError> {
        if count == 0 {
            return Err(BackendError::InvalidArgument(
                "repeat count must be at least 1".into(),
            ));
        }
        if axis.index() > 2 {
            return Err(BackendError::InvalidArgument(format!(
                "axis {} out of range for a 3D array",
                axis.index()
            )));
        }
        let views: Vec<ArrayView3<'_, f32>> = std::iter::repeat_n(array.view(), count).collect();
        ndarray::concatenate(axis, &views)
            .map_err(|err| BackendError::InvalidArgument(format!("repeat failed: {err}")))
    }

    fn rescale(
        &self,
        mut array: Self::Array,
        low: f32,
        high: f32,
    ) -> Result<Self::Array, BackendError> {
        check_bounds("rescale", low, high)?;
        if low == high {
            return Err(BackendError::InvalidArgument(format!(
                "rescale needs a non-empty range, got [{low}, {high}]"
            )));
        }
        let span = high - low;
        array.mapv_inplace(|v| if v >= high { 1.0 } else { (v - low) / span });
        Ok(array)
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        Ok(())
    }
}
