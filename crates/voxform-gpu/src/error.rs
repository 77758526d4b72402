//! Device error model.

use thiserror::Error;
use voxform_core::BackendError;

/// Errors produced while acquiring or driving the compute device.
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no compatible adapter: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),
    #[error("device request failed: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("buffer mapping failed: {0}")]
    Map(#[from] wgpu::BufferAsyncError),
    #[error("device poll failed: {0}")]
    Poll(#[from] wgpu::PollError),
    #[error("map callback dropped before completing")]
    MapChannelClosed,
    #[error("{what} needs {bytes} bytes, device binding limit is {limit}")]
    TooLarge {
        what: &'static str,
        bytes: u64,
        limit: u64,
    },
}

impl From<GpuError> for BackendError {
    fn from(err: GpuError) -> Self {
        match err {
            GpuError::NoAdapter(_) | GpuError::RequestDevice(_) => {
                BackendError::DeviceUnavailable(err.to_string())
            }
            other => BackendError::Device(other.to_string()),
        }
    }
}
