//! Device usage probe for stage telemetry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use voxform_core::telemetry::{DeviceProbe, DeviceSnapshot};
use voxform_core::volume::BYTES_PER_MB;

/// Samples the active device.
///
/// With the `nvml` feature and an NVIDIA driver present, utilization and
/// memory come from NVML. Otherwise utilization is unknown and memory is the
/// total held in Voxform's own buffers.
pub struct GpuProbe {
    allocated: Arc<AtomicU64>,
    #[cfg(feature = "nvml")]
    nvml: Option<nvml_wrapper::Nvml>,
}

impl GpuProbe {
    pub fn new(allocated: Arc<AtomicU64>) -> Self {
        Self {
            allocated,
            #[cfg(feature = "nvml")]
            nvml: match nvml_wrapper::Nvml::init() {
                Ok(nvml) => Some(nvml),
                Err(err) => {
                    tracing::warn!(error = %err, "NVML unavailable, using buffer accounting");
                    None
                }
            },
        }
    }

    fn tracked(&self) -> DeviceSnapshot {
        DeviceSnapshot {
            utilization_percent: None,
            memory_used_mb: self.allocated.load(Ordering::Relaxed) as f64 / BYTES_PER_MB,
        }
    }

    #[cfg(feature = "nvml")]
    fn from_nvml(&self) -> Option<DeviceSnapshot> {
        let device = self.nvml.as_ref()?.device_by_index(0).ok()?;
        let utilization = device.utilization_rates().ok()?;
        let memory = device.memory_info().ok()?;
        Some(DeviceSnapshot {
            utilization_percent: Some(utilization.gpu as f64),
            memory_used_mb: memory.used as f64 / BYTES_PER_MB,
        })
    }
}

impl DeviceProbe for GpuProbe {
    fn sample(&mut self) -> Option<DeviceSnapshot> {
        #[cfg(feature = "nvml")]
        if let Some(snapshot) = self.from_nvml() {
            return Some(snapshot);
        }
        Some(self.tracked())
    }
}
