//! NIfTI integration crate for Voxform.
//!
//! Reads and writes `.nii` / `.nii.gz` volumes through the `nifti` crate and
//! derives the voxel-to-world affine from the header.

mod header;
mod store;

pub use header::{header_affine, write_affine};
pub use nifti::NiftiHeader;
pub use store::NiftiStore;
