//! Device-versus-host agreement tests. Requires a real wgpu device; each
//! test returns early when no adapter is available.
//!
//! Run with: `cargo test -p voxform-gpu`

use std::num::NonZeroU32;
use std::sync::{Mutex, OnceLock};

use ndarray::{Array, Array3, Axis};
use voxform_core::backend::ArrayBackend;
use voxform_core::transform::{expand_slices, normalize_intensities};
use voxform_core::{BackendError, HostBackend};
use voxform_gpu::DeviceBackend;

fn gpu_test_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn device_or_skip() -> Option<DeviceBackend> {
    match DeviceBackend::new() {
        Ok(backend) => Some(backend),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

/// A deterministic scan-like volume with a skewed intensity distribution.
fn create_test_volume(shape: (usize, usize, usize)) -> Array3<f32> {
    let len = shape.0 * shape.1 * shape.2;
    Array::from_iter((0..len).map(|i| {
        let v = ((i as u64 * 2_654_435_761) % 10_007) as f32 / 10_007.0;
        v * v * 900.0 - 50.0
    }))
    .into_shape(shape)
    .unwrap()
}

fn assert_close(device: &Array3<f32>, host: &Array3<f32>, tol: f32) {
    assert_eq!(device.dim(), host.dim());
    let worst = device
        .iter()
        .zip(host.iter())
        .map(|(d, h)| (d - h).abs())
        .fold(0.0f32, f32::max);
    assert!(worst <= tol, "max abs difference {worst} exceeds {tol}");
}

#[test]
fn test_gpu_round_trip_preserves_data() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let host = create_test_volume((7, 5, 3));
    let array = device.to_backend(host.clone()).unwrap();
    assert_eq!(device.shape(&array), [7, 5, 3]);
    let back = device.normalize_to_host(array).unwrap();
    assert_eq!(back, host);
}

#[test]
fn test_gpu_min_max_match_host() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    // Larger than one workgroup squared so the reduction takes several passes.
    let host = create_test_volume((80, 70, 13));
    let array = device.to_backend(host.clone()).unwrap();
    assert_eq!(device.min(&array).unwrap(), HostBackend.min(&host).unwrap());
    assert_eq!(device.max(&array).unwrap(), HostBackend.max(&host).unwrap());
}

#[test]
fn test_gpu_percentile_matches_host() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    // Not a power of two, so the sort pads.
    let host = create_test_volume((33, 17, 9));
    let array = device.to_backend(host.clone()).unwrap();
    for p in [0.0, 5.0, 50.0, 95.0, 100.0] {
        let d = device.percentile(&array, p).unwrap();
        let h = HostBackend.percentile(&host, p).unwrap();
        assert_eq!(d, h, "percentile {p}: device {d}, host {h}");
    }
}

#[test]
fn test_gpu_expansion_matches_host() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let host = create_test_volume((6, 4, 5));
    let multiplier = NonZeroU32::new(3).unwrap();
    let expected = expand_slices(&HostBackend, host.clone(), multiplier).unwrap();
    let array = device.to_backend(host).unwrap();
    let expanded = expand_slices(&device, array, multiplier).unwrap();
    let got = device.normalize_to_host(expanded).unwrap();
    assert_eq!(got.dim(), (6, 4, 15));
    assert_eq!(got, expected);
}

#[test]
fn test_gpu_repeat_along_leading_axis() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let host = create_test_volume((3, 4, 2));
    let expected = HostBackend.repeat(&host, 2, Axis(0)).unwrap();
    let array = device.to_backend(host).unwrap();
    let tiled = device.repeat(&array, 2, Axis(0)).unwrap();
    assert_eq!(device.normalize_to_host(tiled).unwrap(), expected);
}

#[test]
fn test_gpu_normalization_matches_host() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let host = create_test_volume((40, 30, 6));
    let (expected, host_bounds) = normalize_intensities(&HostBackend, host.clone()).unwrap();

    let array = device.to_backend(host).unwrap();
    let (normalized, device_bounds) = normalize_intensities(&device, array).unwrap();
    let got = device.normalize_to_host(normalized).unwrap();

    assert_eq!(device_bounds, host_bounds);
    assert_close(&got, &expected, 1e-6);
    assert!(got.iter().any(|&v| v == 0.0), "no voxel equals 0");
    assert!(got.iter().any(|&v| v == 1.0), "no voxel equals 1");
}

#[test]
fn test_gpu_reports_empty_and_invalid_input() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let empty = device.to_backend(Array3::zeros((0, 3, 3))).unwrap();
    assert!(matches!(device.min(&empty), Err(BackendError::EmptyArray(_))));
    assert!(matches!(
        device.percentile(&empty, 50.0),
        Err(BackendError::EmptyArray(_))
    ));

    let array = device.to_backend(create_test_volume((2, 2, 2))).unwrap();
    assert!(device.clip(array, 5.0, 1.0).is_err());
}

#[test]
fn test_gpu_buffers_are_accounted_and_released() {
    let _lock = gpu_test_lock().lock().expect("gpu test lock poisoned");
    let Some(device) = device_or_skip() else {
        return;
    };
    let before = device.context().allocated_bytes();
    let array = device.to_backend(create_test_volume((16, 16, 16))).unwrap();
    assert!(device.context().allocated_bytes() >= before + 16 * 16 * 16 * 4);
    drop(array);
    assert_eq!(device.context().allocated_bytes(), before);
}
