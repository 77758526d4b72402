//! [`VolumeStore`] over NIfTI-1 files.

use std::fs;
use std::io;
use std::path::Path;

use ndarray::{Array3, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::{debug, info};
use voxform_core::error::StoreError;
use voxform_core::store::{HostVolume, VolumeStore};
use voxform_core::volume::Volume;

use crate::header::{header_affine, write_affine};

/// Loads and saves `.nii` and `.nii.gz` volumes as `f32`.
///
/// Intensity scaling (`scl_slope` / `scl_inter`) is applied on load, so
/// saved files carry identity scaling.
#[derive(Debug, Clone, Copy, Default)]
pub struct NiftiStore;

impl NiftiStore {
    pub fn new() -> Self {
        Self
    }
}

impl VolumeStore for NiftiStore {
    type Header = NiftiHeader;

    fn load(&self, path: &Path) -> Result<HostVolume<NiftiHeader>, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        let format_error = |reason: String| StoreError::Format {
            path: path.to_path_buf(),
            reason,
        };

        let object = ReaderOptions::new()
            .read_file(path)
            .map_err(|err| format_error(err.to_string()))?;
        let header = object.header().clone();
        let mut data = object
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(|err| format_error(err.to_string()))?;

        // Trailing singleton dimensions (a single-frame 4D file) are dropped.
        while data.ndim() > 3 && data.shape().last() == Some(&1) {
            let last = Axis(data.ndim() - 1);
            data = data.index_axis_move(last, 0);
        }
        let data = data.into_dimensionality::<Ix3>().map_err(|_| {
            format_error(format!("expected a 3D volume, got shape {:?}", header.dim))
        })?;
        let data: Array3<f32> = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };

        let affine = header_affine(&header);
        info!(
            path = %path.display(),
            dims = ?data.dim(),
            voxel_size_mm = ?affine.voxel_sizes(),
            "volume loaded"
        );
        Ok(Volume::new(data, affine, header))
    }

    fn save(&self, volume: &HostVolume<NiftiHeader>, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut header = volume.header.clone();
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;
        if header_affine(&header) != volume.affine {
            debug!("affine differs from the header's, writing it as the sform");
            write_affine(&mut header, &volume.affine);
        }

        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&volume.data)
            .map_err(|err| StoreError::Io {
                path: path.to_path_buf(),
                source: io::Error::other(err.to_string()),
            })?;
        info!(path = %path.display(), dims = ?volume.data.dim(), "volume saved");
        Ok(())
    }
}
