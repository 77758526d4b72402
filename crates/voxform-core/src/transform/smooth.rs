//! Separable Gaussian smoothing on host memory.

use ndarray::{Array3, Axis};

/// Standard deviation, in voxels, used by the smoothing stage.
pub const SMOOTHING_SIGMA: f64 = 1.0;

/// Kernel half-width in units of sigma.
const TRUNCATE: f64 = 4.0;

/// Normalized 1D Gaussian kernel of radius `round(TRUNCATE * sigma)`.
pub fn gaussian_kernel(sigma: f64) -> Vec<f64> {
    if sigma <= 0.0 {
        return vec![1.0];
    }
    let radius = (TRUNCATE * sigma + 0.5) as isize;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f64> = (-radius..=radius)
        .map(|x| (-((x * x) as f64) / denom).exp())
        .collect();
    let sum: f64 = kernel.iter().sum();
    for w in &mut kernel {
        *w /= sum;
    }
    kernel
}

/// Isotropic Gaussian filter over all three axes.
///
/// Boundaries are half-sample symmetric (`d c b a | a b c d | d c b a`).
pub fn gaussian_filter(data: &Array3<f32>, sigma: f64) -> Array3<f32> {
    let kernel = gaussian_kernel(sigma);
    let mut current = data.to_owned();
    if kernel.len() == 1 {
        return current;
    }
    for axis in 0..3 {
        current = convolve_axis(&current, Axis(axis), &kernel);
    }
    current
}

fn convolve_axis(input: &Array3<f32>, axis: Axis, kernel: &[f64]) -> Array3<f32> {
    let len = input.len_of(axis);
    let mut output = Array3::<f32>::zeros(input.raw_dim());
    if len == 0 {
        return output;
    }
    let radius = (kernel.len() / 2) as isize;
    let mut lane_buf = vec![0.0_f64; len];
    for (src, mut dst) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        for (b, &v) in lane_buf.iter_mut().zip(src.iter()) {
            *b = v as f64;
        }
        for (i, out) in dst.iter_mut().enumerate() {
            let acc: f64 = kernel
                .iter()
                .enumerate()
                .map(|(k, &w)| {
                    let offset = i as isize + k as isize - radius;
                    w * lane_buf[reflect(offset, len)]
                })
                .sum();
            *out = acc as f32;
        }
    }
    output
}

/// Half-sample symmetric boundary index.
fn reflect(index: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let wrapped = index.rem_euclid(period);
    if wrapped >= len as isize {
        (period - 1 - wrapped) as usize
    } else {
        wrapped as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_is_normalized_with_radius_four() {
        let kernel = gaussian_kernel(1.0);
        assert_eq!(kernel.len(), 9);
        let sum: f64 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
        assert!(kernel[4] > kernel[3] && kernel[3] > kernel[2]);
    }

    #[test]
    fn test_filter_preserves_constant_and_shape() {
        let data = Array3::<f32>::from_elem((5, 6, 7), 0.5);
        let out = gaussian_filter(&data, SMOOTHING_SIGMA);
        assert_eq!(out.dim(), data.dim());
        assert!(out.iter().all(|v| (v - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_impulse_spreads_and_conserves_mass() {
        let mut data = Array3::<f32>::zeros((11, 11, 11));
        data[[5, 5, 5]] = 1.0;
        let out = gaussian_filter(&data, SMOOTHING_SIGMA);
        let total: f32 = out.iter().sum();
        assert!((total - 1.0).abs() < 1e-5, "mass = {total}");
        assert!(out[[5, 5, 5]] < 1.0);
        assert!(out[[4, 5, 5]] > 0.0);
        assert!((out[[4, 5, 5]] - out[[6, 5, 5]]).abs() < 1e-7);
    }

    #[test]
    fn test_reflect_indices() {
        let got: Vec<usize> = (-3..7).map(|i| reflect(i, 3)).collect();
        assert_eq!(got, vec![2, 1, 0, 0, 1, 2, 2, 1, 0, 0]);
    }
}
