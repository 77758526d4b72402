//! Volume representation for the transform pipeline.

use glam::{DMat4, DVec4};
use serde::Serialize;

use crate::params::PipelineParameters;
use crate::transform::resample::resampled_dims;

/// Bytes in one mebibyte, used for every MB figure Voxform reports.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Voxel-index to physical (mm) transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(DMat4);

impl Affine {
    /// Identity mapping: 1 mm isotropic voxels at the origin.
    pub const IDENTITY: Self = Self(DMat4::IDENTITY);

    /// Build from the top three rows of the 4x4 matrix. The last row is
    /// always `[0, 0, 0, 1]`.
    pub fn from_rows(rows: [[f64; 4]; 3]) -> Self {
        let col = |c: usize| DVec4::new(rows[0][c], rows[1][c], rows[2][c], 0.0);
        let mut w = col(3);
        w.w = 1.0;
        Self(DMat4::from_cols(col(0), col(1), col(2), w))
    }

    /// The top three rows of the matrix.
    pub fn to_rows(&self) -> [[f64; 4]; 3] {
        let m = self.0.transpose().to_cols_array_2d();
        [m[0], m[1], m[2]]
    }

    pub fn matrix(&self) -> &DMat4 {
        &self.0
    }

    /// Per-axis voxel spacing: the norms of the 3x3 block's columns.
    pub fn voxel_sizes(&self) -> [f64; 3] {
        [
            self.0.x_axis.truncate().length(),
            self.0.y_axis.truncate().length(),
            self.0.z_axis.truncate().length(),
        ]
    }

    /// Map a (fractional) voxel index to physical coordinates.
    pub fn apply(&self, index: [f64; 3]) -> [f64; 3] {
        let p = self.0 * DVec4::new(index[0], index[1], index[2], 1.0);
        [p.x, p.y, p.z]
    }
}

/// A 3D scan: voxel array, spatial metadata and the opaque header it was
/// loaded with.
///
/// `A` is the array type of the active backend, `H` the store's header
/// type. The pipeline never inspects `H`; it is handed back to the store
/// on save.
#[derive(Debug, Clone)]
pub struct Volume<A, H> {
    /// Voxel intensities, shape `(x, y, z)` with `z` the slice axis.
    pub data: A,
    /// Voxel-index to physical transform.
    pub affine: Affine,
    /// Source file header, preserved verbatim.
    pub header: H,
}

impl<A, H> Volume<A, H> {
    pub fn new(data: A, affine: Affine, header: H) -> Self {
        Self {
            data,
            affine,
            header,
        }
    }

    /// Per-axis voxel spacing in mm, derived from the affine.
    pub fn spacing(&self) -> [f64; 3] {
        self.affine.voxel_sizes()
    }

    /// Replace the voxel array, keeping affine and header.
    pub fn try_map_data<B, E>(self, f: impl FnOnce(A) -> Result<B, E>) -> Result<Volume<B, H>, E> {
        Ok(Volume {
            data: f(self.data)?,
            affine: self.affine,
            header: self.header,
        })
    }
}

/// Summary of the input volume and the shape the run will produce.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeProperties {
    /// Input dimensions `(x, y, z)`.
    pub original_dims: [usize; 3],
    /// Voxel size in mm per axis.
    pub voxel_size_mm: [f64; 3],
    /// Slice count after expansion.
    pub expanded_slices: usize,
    /// In-plane dimensions after resampling.
    pub scaled_dims: [usize; 2],
    /// Voxel element type held by the pipeline.
    pub data_type: &'static str,
    /// Estimated size of the output array in MB.
    pub estimated_size_mb: f64,
}

impl VolumeProperties {
    pub fn describe(shape: [usize; 3], affine: &Affine, params: &PipelineParameters) -> Self {
        let multiplier = params.multiplier().get() as usize;
        let scaled = resampled_dims(shape, params.scale_factor());
        let input_bytes = (shape.iter().product::<usize>() * size_of::<f32>()) as f64;
        let scale = params.scale_factor();
        Self {
            original_dims: shape,
            voxel_size_mm: affine.voxel_sizes(),
            expanded_slices: shape[2] * multiplier,
            scaled_dims: [scaled[0], scaled[1]],
            data_type: "float32",
            estimated_size_mb: input_bytes * multiplier as f64 * scale * scale / BYTES_PER_MB,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    #[test]
    fn test_affine_rows_round_trip() {
        let rows = [
            [2.0, 0.0, 0.0, -90.0],
            [0.0, 2.5, 0.0, -126.0],
            [0.0, 0.0, 3.0, -72.0],
        ];
        let affine = Affine::from_rows(rows);
        assert_eq!(affine.to_rows(), rows);
        assert_eq!(affine.apply([1.0, 1.0, 1.0]), [-88.0, -123.5, -69.0]);
    }

    #[test]
    fn test_voxel_sizes_ignore_rotation() {
        // 90 degree rotation about z, 2mm in-plane, 4mm slices.
        let affine = Affine::from_rows([
            [0.0, -2.0, 0.0, 0.0],
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 0.0, 4.0, 0.0],
        ]);
        let sizes = affine.voxel_sizes();
        for (got, want) in sizes.iter().zip([2.0, 2.0, 4.0]) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }

    #[test]
    fn test_properties_estimate_output_size() {
        let params = PipelineParameters::new(NonZeroU32::new(3).unwrap(), 2.0, false).unwrap();
        let props = VolumeProperties::describe([64, 64, 32], &Affine::IDENTITY, &params);
        assert_eq!(props.expanded_slices, 96);
        assert_eq!(props.scaled_dims, [128, 128]);
        // 64*64*32 f32 = 0.5 MB, times 3 slices, times 4 in-plane.
        assert!((props.estimated_size_mb - 6.0).abs() < 1e-9);
    }
}
