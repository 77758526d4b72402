//! Slice expansion by whole-slice tiling.

use std::num::NonZeroU32;

use crate::backend::{ArrayBackend, Axis};
use crate::error::BackendError;

/// The slice axis of every volume.
pub const SLICE_AXIS: Axis = Axis(2);

/// Tile the volume `multiplier` times along the slice axis.
///
/// Output slice `k` is input slice `k mod z`. Nothing is interpolated.
pub fn expand_slices<B: ArrayBackend>(
    backend: &B,
    array: B::Array,
    multiplier: NonZeroU32,
) -> Result<B::Array, BackendError> {
    if multiplier.get() == 1 {
        return Ok(array);
    }
    backend.repeat(&array, multiplier.get() as usize, SLICE_AXIS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use ndarray::{Array, Array3};

    #[test]
    fn test_multiplier_one_is_identity() {
        let data = Array3::<f32>::from_elem((2, 2, 3), 1.5);
        let out = expand_slices(&HostBackend, data.clone(), NonZeroU32::MIN).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_slice_count_and_order() {
        let data = Array::from_iter((0..2 * 2 * 3).map(|v| v as f32))
            .into_shape((2, 2, 3))
            .unwrap();
        for m in 2..5u32 {
            let out =
                expand_slices(&HostBackend, data.clone(), NonZeroU32::new(m).unwrap()).unwrap();
            assert_eq!(out.dim().2, 3 * m as usize);
            for k in 0..out.dim().2 {
                assert_eq!(out.index_axis(SLICE_AXIS, k), data.index_axis(SLICE_AXIS, k % 3));
            }
        }
    }
}
