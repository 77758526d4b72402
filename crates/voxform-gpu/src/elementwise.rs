//! Per-element kernels: in-place clip and rescale, and axis tiling.

use bytemuck::{Pod, Zeroable};
use tracing::debug;

use crate::buffers::{TrackedBuffer, uniform};
use crate::context::GpuContext;
use crate::error::GpuError;
use crate::layout::{
    create_compute_pipeline, create_shader, storage_ro_entry, storage_rw_entry, uniform_entry,
    workgroups_for,
};

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MapParams {
    len: u32,
    _pad: u32,
    low: f32,
    high: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct TileParams {
    out_len: u32,
    axis_in: u32,
    axis_out: u32,
    inner: u32,
}

struct Kernel {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

/// Compiled `elementwise.wgsl` and `tile.wgsl` pipelines.
pub struct ElementwiseKernels {
    clip: Kernel,
    rescale: Kernel,
    tile: Kernel,
}

impl ElementwiseKernels {
    pub fn new(device: &wgpu::Device) -> Self {
        let map_shader = create_shader(
            device,
            "elementwise",
            include_str!("../shaders/elementwise.wgsl"),
        );
        let map_entries = [storage_rw_entry(0), uniform_entry(1, 16)];
        let (clip, clip_layout) = create_compute_pipeline(device, &map_shader, "clip", &map_entries);
        let (rescale, rescale_layout) =
            create_compute_pipeline(device, &map_shader, "rescale", &map_entries);

        let tile_shader = create_shader(device, "tile", include_str!("../shaders/tile.wgsl"));
        let (tile, tile_layout) = create_compute_pipeline(
            device,
            &tile_shader,
            "tile",
            &[storage_ro_entry(0), storage_rw_entry(1), uniform_entry(2, 16)],
        );

        Self {
            clip: Kernel {
                pipeline: clip,
                layout: clip_layout,
            },
            rescale: Kernel {
                pipeline: rescale,
                layout: rescale_layout,
            },
            tile: Kernel {
                pipeline: tile,
                layout: tile_layout,
            },
        }
    }

    /// Clamp every element of `data` to `[low, high]` in place.
    pub fn clip(&self, ctx: &GpuContext, data: &TrackedBuffer, low: f32, high: f32) {
        self.map_in_place(ctx, &self.clip, "clip", data, low, high);
    }

    /// Map `[low, high]` onto `[0, 1]` in place; elements `>= high` become 1.
    pub fn rescale(&self, ctx: &GpuContext, data: &TrackedBuffer, low: f32, high: f32) {
        self.map_in_place(ctx, &self.rescale, "rescale", data, low, high);
    }

    /// Tile a row-major `shape` array `count` times along `axis`.
    pub fn tile(
        &self,
        ctx: &GpuContext,
        src: &TrackedBuffer,
        shape: [usize; 3],
        count: usize,
        axis: usize,
    ) -> Result<TrackedBuffer, GpuError> {
        let out_len = src.len * count;
        let dst = TrackedBuffer::zeroed(ctx, "voxform_volume", out_len)?;
        if out_len == 0 {
            return Ok(dst);
        }

        let params = TileParams {
            out_len: out_len as u32,
            axis_in: shape[axis] as u32,
            axis_out: (shape[axis] * count) as u32,
            inner: shape[axis + 1..].iter().product::<usize>() as u32,
        };
        let params_buf = uniform(ctx, "voxform_tile_params", &params);
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxform_tile_bg"),
            layout: &self.tile.layout,
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
        submit_single(ctx, &self.tile.pipeline, &bind_group, "tile", out_len);
        Ok(dst)
    }

    fn map_in_place(
        &self,
        ctx: &GpuContext,
        kernel: &Kernel,
        name: &str,
        data: &TrackedBuffer,
        low: f32,
        high: f32,
    ) {
        if data.len == 0 {
            return;
        }
        let params = MapParams {
            len: data.len as u32,
            _pad: 0,
            low,
            high,
        };
        let params_buf = uniform(ctx, "voxform_map_params", &params);
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("voxform_map_bg"),
            layout: &kernel.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: data.buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: params_buf.as_entire_binding(),
                },
            ],
        });
        submit_single(ctx, &kernel.pipeline, &bind_group, name, data.len);
    }
}

/// Record and submit one dispatch covering `len` elements.
fn submit_single(
    ctx: &GpuContext,
    pipeline: &wgpu::ComputePipeline,
    bind_group: &wgpu::BindGroup,
    name: &str,
    len: usize,
) {
    let (x, y) = ctx.dispatch_grid(workgroups_for(len));
    debug!(kernel = name, len, groups_x = x, groups_y = y, "dispatch");

    let mut encoder = ctx
        .device()
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("voxform_elementwise_encoder"),
        });
    {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("voxform_elementwise_pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(x, y, 1);
    }
    ctx.queue().submit(std::iter::once(encoder.finish()));
}
