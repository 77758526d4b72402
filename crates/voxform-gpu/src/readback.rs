//! Device-to-host readback through a reusable staging buffer.

use std::sync::mpsc;

use parking_lot::Mutex;
use tracing::debug;

use crate::context::GpuContext;
use crate::error::GpuError;

/// Copies device buffers into host memory. Blocks until the copy completes.
///
/// The staging buffer grows to the largest readback seen and is reused.
#[derive(Default)]
pub struct Readback {
    staging: Mutex<Option<wgpu::Buffer>>,
}

impl Readback {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `count` `f32`s starting at element `first` of `src`.
    pub fn read_f32(
        &self,
        ctx: &GpuContext,
        src: &wgpu::Buffer,
        first: usize,
        count: usize,
    ) -> Result<Vec<f32>, GpuError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = count as u64 * 4;
        let offset = first as u64 * 4;

        let mut cache = self.staging.lock();
        let staging = match cache.take() {
            Some(buf) if buf.size() >= size => buf,
            _ => {
                debug!(bytes = size, "growing readback staging buffer");
                ctx.device().create_buffer(&wgpu::BufferDescriptor {
                    label: Some("voxform_readback_staging"),
                    size,
                    usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                    mapped_at_creation: false,
                })
            }
        };

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("voxform_readback_encoder"),
            });
        encoder.copy_buffer_to_buffer(src, offset, &staging, 0, size);
        ctx.queue().submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..size);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        ctx.wait_idle()?;
        rx.recv().map_err(|_| GpuError::MapChannelClosed)??;

        let data = slice.get_mapped_range();
        let values = bytemuck::cast_slice::<u8, f32>(&data).to_vec();
        drop(data);
        staging.unmap();
        *cache = Some(staging);
        Ok(values)
    }
}
