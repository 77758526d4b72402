//! Bind group layout and compute pipeline helpers shared by the kernels.

use std::num::NonZeroU64;

/// Threads per workgroup in every Voxform kernel.
pub const WORKGROUP_SIZE: u32 = 256;

pub fn storage_ro_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: true },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(4),
        },
        count: None,
    }
}

pub fn storage_rw_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only: false },
            has_dynamic_offset: false,
            min_binding_size: NonZeroU64::new(4),
        },
        count: None,
    }
}

pub fn uniform_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    uniform_entry_with(binding, min_size, false)
}

/// A uniform binding addressed with a per-dispatch dynamic offset.
pub fn dynamic_uniform_entry(binding: u32, min_size: u64) -> wgpu::BindGroupLayoutEntry {
    uniform_entry_with(binding, min_size, true)
}

fn uniform_entry_with(
    binding: u32,
    min_size: u64,
    has_dynamic_offset: bool,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset,
            min_binding_size: NonZeroU64::new(min_size),
        },
        count: None,
    }
}

/// Build the pipeline for one entry point of `shader`, with its own layout.
pub fn create_compute_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    entry_point: &str,
    layout_entries: &[wgpu::BindGroupLayoutEntry],
) -> (wgpu::ComputePipeline, wgpu::BindGroupLayout) {
    let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("voxform_{entry_point}_layout")),
        entries: layout_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("voxform_{entry_point}_pipeline_layout")),
        bind_group_layouts: &[&bind_group_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("voxform_{entry_point}_pipeline")),
        layout: Some(&pipeline_layout),
        module: shader,
        entry_point: Some(entry_point),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });

    (pipeline, bind_group_layout)
}

pub fn create_shader(device: &wgpu::Device, name: &str, wgsl_source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("voxform_{name}_shader")),
        source: wgpu::ShaderSource::Wgsl(wgsl_source.into()),
    })
}

/// Workgroups needed to give each of `len` elements one thread.
pub fn workgroups_for(len: usize) -> u32 {
    (len as u64).div_ceil(WORKGROUP_SIZE as u64) as u32
}
