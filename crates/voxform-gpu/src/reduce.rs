//! Min/max tree reduction.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::buffers::{TrackedBuffer, uniform};
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::layout::{
    create_compute_pipeline, create_shader, storage_ro_entry, storage_rw_entry, uniform_entry,
    workgroups_for,
};
use crate::readback::Readback;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReduceOp {
    Min,
    Max,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct ReduceParams {
    len: u32,
    groups: u32,
    _pad0: u32,
    _pad1: u32,
}

/// Compiled `reduce.wgsl` pipelines.
pub struct ReduceKernels {
    min: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
    max: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
}

impl ReduceKernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = create_shader(device, "reduce", include_str!("../shaders/reduce.wgsl"));
        let entries = [storage_ro_entry(0), storage_rw_entry(1), uniform_entry(2, 16)];
        Self {
            min: create_compute_pipeline(device, &shader, "reduce_min", &entries),
            max: create_compute_pipeline(device, &shader, "reduce_max", &entries),
        }
    }

    /// Fold `data` down to a single value. `data` must be non-empty.
    ///
    /// Each pass shrinks the input 256-fold; all passes go into one
    /// submission and only the final element is read back.
    pub fn reduce(
        &self,
        ctx: &GpuContext,
        readback: &Readback,
        data: &TrackedBuffer,
        op: ReduceOp,
    ) -> Result<f32, GpuError> {
        let (pipeline, layout) = match op {
            ReduceOp::Min => &self.min,
            ReduceOp::Max => &self.max,
        };

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("voxform_reduce_encoder"),
            });

        let mut partials: Vec<TrackedBuffer> = Vec::new();
        let mut len = data.len;
        let mut passes = 0;
        while len > 1 {
            let groups = workgroups_for(len);
            let dst = TrackedBuffer::zeroed(ctx, "voxform_reduce_partials", groups as usize)?;
            let src = partials.last().unwrap_or(data);
            let params = ReduceParams {
                len: len as u32,
                groups,
                _pad0: 0,
                _pad1: 0,
            };
            let params_buf = uniform(ctx, "voxform_reduce_params", &params);
            let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("voxform_reduce_bg"),
                layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: src.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: dst.buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: params_buf.as_entire_binding(),
                    },
                ],
            });

            let (x, y) = ctx.dispatch_grid(groups);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("voxform_reduce_pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(x, y, 1);
            }

            partials.push(dst);
            len = groups as usize;
            passes += 1;
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        debug!(?op, elements = data.len, passes, "reduce");

        let result = partials.last().unwrap_or(data);
        let values = readback.read_f32(ctx, &result.buffer, 0, 1)?;
        values.first().copied().ok_or(GpuError::MapChannelClosed)
    }
}
