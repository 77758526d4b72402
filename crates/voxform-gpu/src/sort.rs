//! Bitonic sort, used to take exact order statistics on the device.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::buffers::TrackedBuffer;
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::layout::{
    create_compute_pipeline, create_shader, dynamic_uniform_entry, storage_ro_entry,
    storage_rw_entry, workgroups_for,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SortParams {
    len: u32,
    padded: u32,
    k: u32,
    j: u32,
    pad_value: f32,
    _pad: [u32; 3],
}

const PARAMS_SIZE: u64 = std::mem::size_of::<SortParams>() as u64;

/// Compiled `sort.wgsl` pipelines.
pub struct SortKernels {
    pad: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
    step: (wgpu::ComputePipeline, wgpu::BindGroupLayout),
}

impl SortKernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let shader = create_shader(device, "sort", include_str!("../shaders/sort.wgsl"));
        Self {
            pad: create_compute_pipeline(
                device,
                &shader,
                "pad",
                &[
                    storage_ro_entry(0),
                    storage_rw_entry(1),
                    dynamic_uniform_entry(2, PARAMS_SIZE),
                ],
            ),
            step: create_compute_pipeline(
                device,
                &shader,
                "bitonic_step",
                &[storage_rw_entry(1), dynamic_uniform_entry(2, PARAMS_SIZE)],
            ),
        }
    }

    /// Return an ascending copy of `data`, padded with `+inf` up to the next
    /// power of two. The first `data.len` elements are the sorted input.
    pub fn sorted_copy(
        &self,
        ctx: &GpuContext,
        data: &TrackedBuffer,
    ) -> Result<TrackedBuffer, GpuError> {
        let padded = data.len.max(1).next_power_of_two();
        let keys = TrackedBuffer::zeroed(ctx, "voxform_sort_keys", padded)?;

        // One params block per dispatch: the pad pass, then every (k, j).
        let base = SortParams {
            len: data.len as u32,
            padded: padded as u32,
            k: 0,
            j: 0,
            pad_value: f32::INFINITY,
            _pad: [0; 3],
        };
        let mut blocks = vec![base];
        let mut k = 2;
        while k <= padded {
            let mut j = k / 2;
            while j > 0 {
                blocks.push(SortParams {
                    k: k as u32,
                    j: j as u32,
                    ..base
                });
                j /= 2;
            }
            k *= 2;
        }

        let stride = (ctx.limits().min_uniform_buffer_offset_alignment as u64).max(PARAMS_SIZE);
        let mut params_bytes = vec![0u8; stride as usize * blocks.len()];
        for (i, block) in blocks.iter().enumerate() {
            let at = i * stride as usize;
            params_bytes[at..at + PARAMS_SIZE as usize].copy_from_slice(bytemuck::bytes_of(block));
        }
        let params_buf = ctx
            .device()
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("voxform_sort_params"),
                contents: &params_bytes,
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let params_binding = wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &params_buf,
            offset: 0,
            size: NonZeroU64::new(PARAMS_SIZE),
        });

        let pad_bg = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxform_sort_pad_bg"),
            layout: &self.pad.1,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: data.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: keys.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_binding.clone(),
                },
            ],
        });
        let step_bg = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxform_sort_step_bg"),
            layout: &self.step.1,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: keys.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_binding,
                },
            ],
        });

        let (x, y) = ctx.dispatch_grid(workgroups_for(padded));
        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("voxform_sort_encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("voxform_sort_pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pad.0);
            pass.set_bind_group(0, &pad_bg, &[0]);
            pass.dispatch_workgroups(x, y, 1);

            pass.set_pipeline(&self.step.0);
            for i in 1..blocks.len() {
                pass.set_bind_group(0, &step_bg, &[(i as u64 * stride) as u32]);
                pass.dispatch_workgroups(x, y, 1);
            }
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        debug!(
            elements = data.len,
            padded,
            passes = blocks.len() - 1,
            "bitonic sort"
        );

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_block_fits_uniform_alignment() {
        assert_eq!(PARAMS_SIZE, 32);
        assert_eq!(PARAMS_SIZE % 16, 0);
    }
}
