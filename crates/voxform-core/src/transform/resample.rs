//! In-plane cubic B-spline resampling.
//!
//! Axes x and y are resampled independently (the spline is separable); the
//! slice axis is never touched. Coefficients are obtained with the exact
//! recursive prefilter for the cubic B-spline, so the interpolant passes
//! through every input sample. Boundaries use whole-sample mirroring.

use ndarray::{Array3, Axis};

/// Pole of the cubic B-spline prefilter, `sqrt(3) - 2`.
const POLE: f64 = -0.267_949_192_431_122_7;

/// Output dimensions for an in-plane scale: `round(x * s), round(y * s), z`.
///
/// Halves round to the even neighbour.
pub fn resampled_dims(shape: [usize; 3], scale_factor: f64) -> [usize; 3] {
    let scale = |n: usize| ((n as f64 * scale_factor).round_ties_even() as usize).max(1);
    [scale(shape[0]), scale(shape[1]), shape[2]]
}

/// Resample axes x and y by `scale_factor` with order-3 spline interpolation.
pub fn resample_in_plane(data: &Array3<f32>, scale_factor: f64) -> Array3<f32> {
    let (x, y, z) = data.dim();
    let [out_x, out_y, _] = resampled_dims([x, y, z], scale_factor);
    let along_x = resample_axis(data, Axis(0), out_x);
    resample_axis(&along_x, Axis(1), out_y)
}

fn resample_axis(input: &Array3<f32>, axis: Axis, out_len: usize) -> Array3<f32> {
    let in_len = input.len_of(axis);
    if in_len == out_len {
        return input.clone();
    }
    let mut shape = input.raw_dim();
    shape[axis.index()] = out_len;
    let mut output = Array3::<f32>::zeros(shape);
    if in_len == 0 {
        return output;
    }

    let taps = sample_taps(in_len, out_len);
    let mut coeffs = vec![0.0_f64; in_len];
    for (src, mut dst) in input.lanes(axis).into_iter().zip(output.lanes_mut(axis)) {
        for (c, &v) in coeffs.iter_mut().zip(src.iter()) {
            *c = v as f64;
        }
        prefilter(&mut coeffs);
        for (out, tap) in dst.iter_mut().zip(&taps) {
            let value: f64 = tap
                .indices
                .iter()
                .zip(&tap.weights)
                .map(|(&i, &w)| coeffs[i] * w)
                .sum();
            *out = value as f32;
        }
    }
    output
}

/// Four coefficient indices and basis weights for one output sample.
struct Tap {
    indices: [usize; 4],
    weights: [f64; 4],
}

/// Precompute taps for mapping `in_len` samples onto `out_len`, aligning
/// the first and last samples of both grids.
fn sample_taps(in_len: usize, out_len: usize) -> Vec<Tap> {
    let step = if out_len > 1 {
        (in_len - 1) as f64 / (out_len - 1) as f64
    } else {
        0.0
    };
    (0..out_len)
        .map(|j| {
            let position = j as f64 * step;
            let base = position.floor();
            let t = position - base;
            let base = base as isize;
            let indices = std::array::from_fn(|k| mirror(base - 1 + k as isize, in_len));
            Tap {
                indices,
                weights: cubic_bspline_weights(t),
            }
        })
        .collect()
}

fn cubic_bspline_weights(t: f64) -> [f64; 4] {
    let t2 = t * t;
    let t3 = t2 * t;
    let one_minus = 1.0 - t;
    [
        one_minus * one_minus * one_minus / 6.0,
        (4.0 - 6.0 * t2 + 3.0 * t3) / 6.0,
        (1.0 + 3.0 * t + 3.0 * t2 - 3.0 * t3) / 6.0,
        t3 / 6.0,
    ]
}

/// Whole-sample mirror: `... 2 1 | 0 1 2 ... n-1 | n-2 ...`.
fn mirror(index: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let wrapped = index.rem_euclid(period);
    if wrapped >= len as isize {
        (period - wrapped) as usize
    } else {
        wrapped as usize
    }
}

/// In-place conversion of samples to cubic B-spline coefficients.
fn prefilter(c: &mut [f64]) {
    let n = c.len();
    if n < 2 {
        return;
    }
    let z = POLE;
    let gain = (1.0 - z) * (1.0 - 1.0 / z);
    for v in c.iter_mut() {
        *v *= gain;
    }

    // Causal initialisation for a mirrored signal of period 2n - 2.
    let zn = z.powi(n as i32 - 1);
    let mut sum = c[0] + zn * c[n - 1];
    let mut z_lo = z;
    let mut z_hi = zn * zn / z;
    for value in c.iter().take(n - 1).skip(1) {
        sum += (z_lo + z_hi) * value;
        z_lo *= z;
        z_hi /= z;
    }
    c[0] = sum / (1.0 - zn * zn);
    for i in 1..n {
        c[i] += z * c[i - 1];
    }

    c[n - 1] = (z / (z * z - 1.0)) * (c[n - 1] + z * c[n - 2]);
    for i in (0..n - 1).rev() {
        c[i] = z * (c[i + 1] - c[i]);
    }
}
