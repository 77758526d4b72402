//! Read/write interface to an on-disk volume format.

use std::path::Path;

use ndarray::Array3;

use crate::error::StoreError;
use crate::volume::Volume;

/// A volume as it exists in host memory, before or after the pipeline.
pub type HostVolume<H> = Volume<Array3<f32>, H>;

/// Opens and persists volumes in a concrete file format.
///
/// The store owns the header type; the pipeline carries it through
/// untouched and hands it back on save.
pub trait VolumeStore {
    /// Format-specific header, preserved across a load/save round trip.
    type Header;

    /// Open the volume at `path`.
    ///
    /// Fails with [`StoreError::NotFound`] when the path does not resolve
    /// and [`StoreError::Format`] when the content cannot be parsed.
    fn load(&self, path: &Path) -> Result<HostVolume<Self::Header>, StoreError>;

    /// Write `volume` to `path`, creating missing parent directories.
    ///
    /// The spatial metadata written is the one the volume was loaded with,
    /// whatever shape the voxel array has now.
    fn save(&self, volume: &HostVolume<Self::Header>, path: &Path) -> Result<(), StoreError>;
}
