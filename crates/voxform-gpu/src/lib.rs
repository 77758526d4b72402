//! Voxform GPU: wgpu compute backend for the transform pipeline.
//!
//! This crate owns all device resources. It implements
//! [`voxform_core::ArrayBackend`] over storage buffers and exposes a device
//! telemetry probe; the pipeline itself lives in `voxform-core`.

pub mod backend;
pub mod buffers;
pub mod context;
pub mod elementwise;
pub mod error;
pub mod layout;
pub mod readback;
pub mod reduce;
pub mod sort;
pub mod telemetry;

pub use backend::{DeviceArray, DeviceBackend};
pub use context::GpuContext;
pub use error::GpuError;
pub use telemetry::GpuProbe;

/// Device features every Voxform kernel relies on.
pub fn required_features() -> wgpu::Features {
    wgpu::Features::empty()
}
