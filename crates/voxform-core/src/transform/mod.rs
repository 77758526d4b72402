//! Transform stages: resampling, expansion, normalization, smoothing.

pub mod expand;
pub mod normalize;
pub mod resample;
pub mod smooth;

pub use expand::expand_slices;
pub use normalize::{NormalizationBounds, normalize_intensities};
pub use resample::{resample_in_plane, resampled_dims};
pub use smooth::{SMOOTHING_SIGMA, gaussian_filter};
