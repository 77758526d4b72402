//! Robust intensity normalization.
//!
//! Intensities are clipped to the 5th..95th percentile window and then
//! rescaled to `[0, 1]` using the clipped array's own extrema.

use serde::Serialize;

use crate::backend::ArrayBackend;
use crate::error::TransformError;

pub const LOWER_PERCENTILE: f64 = 5.0;
pub const UPPER_PERCENTILE: f64 = 95.0;

/// Values observed while normalizing, kept for the run report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizationBounds {
    pub lower_percentile: f32,
    pub upper_percentile: f32,
    pub clipped_min: f32,
    pub clipped_max: f32,
}

/// Clip to the percentile window and rescale to `[0, 1]`.
///
/// Fails with [`TransformError::DegenerateRange`] when the clipped array
/// is constant, since the rescale would divide by zero.
pub fn normalize_intensities<B: ArrayBackend>(
    backend: &B,
    array: B::Array,
) -> Result<(B::Array, NormalizationBounds), TransformError> {
    let low = backend.percentile(&array, LOWER_PERCENTILE)? as f32;
    let high = backend.percentile(&array, UPPER_PERCENTILE)? as f32;
    let clipped = backend.clip(array, low, high)?;

    let clipped_min = backend.min(&clipped)?;
    let clipped_max = backend.max(&clipped)?;
    if !(clipped_max > clipped_min) {
        return Err(TransformError::DegenerateRange {
            low: clipped_min,
            high: clipped_max,
        });
    }

    let scaled = backend.rescale(clipped, clipped_min, clipped_max)?;
    Ok((
        scaled,
        NormalizationBounds {
            lower_percentile: low,
            upper_percentile: high,
            clipped_min,
            clipped_max,
        },
    ))
}
