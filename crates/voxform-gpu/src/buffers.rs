//! Storage buffers with allocation accounting.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use wgpu::util::DeviceExt;

use crate::context::GpuContext;
use crate::error::GpuError;

/// Smallest buffer Voxform creates; storage bindings need a non-zero size.
const MIN_BUFFER_BYTES: u64 = 16;

/// A storage buffer of `f32` counted against its context's allocation total.
pub struct TrackedBuffer {
    pub buffer: wgpu::Buffer,
    /// Number of meaningful `f32` elements; the buffer may be larger.
    pub len: usize,
    size: u64,
    tracker: Arc<AtomicU64>,
}

impl TrackedBuffer {
    /// Upload `data` as a new storage buffer.
    pub fn upload(ctx: &GpuContext, label: &'static str, data: &[f32]) -> Result<Self, GpuError> {
        let size = padded_size(ctx, label, data.len())?;
        let buffer = if data.len() as u64 * 4 == size {
            ctx.device()
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(label),
                    contents: bytemuck::cast_slice(data),
                    usage: storage_usages(),
                })
        } else {
            let buffer = create(ctx, label, size);
            if !data.is_empty() {
                ctx.queue()
                    .write_buffer(&buffer, 0, bytemuck::cast_slice(data));
            }
            buffer
        };
        Ok(Self::track(ctx, buffer, data.len(), size))
    }

    /// Create a buffer for `len` elements; wgpu zero-initializes it.
    pub fn zeroed(ctx: &GpuContext, label: &'static str, len: usize) -> Result<Self, GpuError> {
        let size = padded_size(ctx, label, len)?;
        let buffer = create(ctx, label, size);
        Ok(Self::track(ctx, buffer, len, size))
    }

    /// Buffer size in bytes, including padding.
    pub fn byte_size(&self) -> u64 {
        self.size
    }

    /// Bytes holding real elements.
    pub fn data_bytes(&self) -> u64 {
        self.len as u64 * 4
    }

    fn track(ctx: &GpuContext, buffer: wgpu::Buffer, len: usize, size: u64) -> Self {
        let tracker = ctx.allocation_tracker();
        tracker.fetch_add(size, Ordering::Relaxed);
        Self {
            buffer,
            len,
            size,
            tracker,
        }
    }
}

impl Drop for TrackedBuffer {
    fn drop(&mut self) {
        self.tracker.fetch_sub(self.size, Ordering::Relaxed);
    }
}

/// A small uniform buffer initialized from a `Pod` value.
pub fn uniform<T: bytemuck::Pod>(ctx: &GpuContext, label: &str, value: &T) -> wgpu::Buffer {
    ctx.device()
        .create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(value),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        })
}

fn storage_usages() -> wgpu::BufferUsages {
    wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST
}

fn create(ctx: &GpuContext, label: &str, size: u64) -> wgpu::Buffer {
    ctx.device().create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: storage_usages(),
        mapped_at_creation: false,
    })
}

fn padded_size(ctx: &GpuContext, what: &'static str, len: usize) -> Result<u64, GpuError> {
    let bytes = (len as u64).saturating_mul(4).max(MIN_BUFFER_BYTES);
    let limits = ctx.limits();
    let limit = (limits.max_storage_buffer_binding_size as u64).min(limits.max_buffer_size);
    if bytes > limit {
        return Err(GpuError::TooLarge { what, bytes, limit });
    }
    Ok(bytes)
}
