//! Scoped ownership of the wgpu adapter, device and queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::error::GpuError;

/// The compute device for one run.
///
/// Acquired once at run start. Dropping the context waits for outstanding
/// work and destroys the device, so every exit path releases it.
pub struct GpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    allocated: Arc<AtomicU64>,
}

impl GpuContext {
    /// Acquire the highest-performance adapter the platform offers.
    pub fn new() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            ..Default::default()
        }))?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("voxform_device"),
            required_features: crate::required_features(),
            required_limits: limits.clone(),
            ..Default::default()
        }))?;

        info!(
            adapter = %adapter_info.name,
            backend = ?adapter_info.backend,
            max_binding_mb = limits.max_storage_buffer_binding_size / (1024 * 1024),
            "compute device acquired"
        );

        Ok(Self {
            device,
            queue,
            adapter_info,
            limits,
            allocated: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.adapter_info
    }

    pub fn limits(&self) -> &wgpu::Limits {
        &self.limits
    }

    /// Bytes currently held in buffers created through this context.
    pub fn allocated_bytes(&self) -> u64 {
        self.allocated.load(Ordering::Relaxed)
    }

    /// Shared allocation counter, for buffers and probes that outlive a borrow.
    pub fn allocation_tracker(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.allocated)
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) -> Result<(), GpuError> {
        self.device.poll(wgpu::PollType::wait_indefinitely())?;
        Ok(())
    }

    /// Workgroup grid covering `groups` workgroups, split into rows when it
    /// exceeds the per-dimension dispatch limit.
    pub fn dispatch_grid(&self, groups: u32) -> (u32, u32) {
        let max = self.limits.max_compute_workgroups_per_dimension.max(1);
        if groups <= max {
            (groups.max(1), 1)
        } else {
            (max, groups.div_ceil(max))
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        if let Err(err) = self.wait_idle() {
            debug!(error = %err, "device poll failed during release");
        }
        self.device.destroy();
        debug!(
            adapter = %self.adapter_info.name,
            outstanding_bytes = self.allocated_bytes(),
            "compute device released"
        );
    }
}
