//! [`ArrayBackend`] over wgpu storage buffers.

use ndarray::{Array3, Axis};
use tracing::debug;
use voxform_core::backend::{ArrayBackend, PercentileRank, check_bounds};
use voxform_core::error::BackendError;

use crate::buffers::TrackedBuffer;
use crate::context::GpuContext;
use crate::elementwise::ElementwiseKernels;
use crate::readback::Readback;
use crate::reduce::{ReduceKernels, ReduceOp};
use crate::sort::SortKernels;
use crate::telemetry::GpuProbe;

/// A volume array resident in device memory, row-major `(x, y, z)`.
pub struct DeviceArray {
    data: TrackedBuffer,
    shape: [usize; 3],
}

impl DeviceArray {
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn len(&self) -> usize {
        self.data.len
    }

    pub fn is_empty(&self) -> bool {
        self.data.len == 0
    }
}

/// Runs the array operations as compute kernels on one device.
pub struct DeviceBackend {
    elementwise: ElementwiseKernels,
    reduce: ReduceKernels,
    sort: SortKernels,
    readback: Readback,
    // Declared last so kernels and buffers are released before the device.
    ctx: GpuContext,
}

impl DeviceBackend {
    /// Acquire a device and compile every kernel.
    ///
    /// Fails with [`BackendError::DeviceUnavailable`] when no compatible
    /// adapter or device can be obtained.
    pub fn new() -> Result<Self, BackendError> {
        let ctx = GpuContext::new()?;
        Ok(Self::with_context(ctx))
    }

    pub fn with_context(ctx: GpuContext) -> Self {
        let device = ctx.device();
        Self {
            elementwise: ElementwiseKernels::new(device),
            reduce: ReduceKernels::new(device),
            sort: SortKernels::new(device),
            readback: Readback::new(),
            ctx,
        }
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// A telemetry probe tied to this backend's allocations.
    pub fn probe(&self) -> GpuProbe {
        GpuProbe::new(self.ctx.allocation_tracker())
    }

    fn extremum(&self, array: &DeviceArray, op: ReduceOp) -> Result<f32, BackendError> {
        if array.is_empty() {
            return Err(BackendError::EmptyArray(match op {
                ReduceOp::Min => "min",
                ReduceOp::Max => "max",
            }));
        }
        Ok(self
            .reduce
            .reduce(&self.ctx, &self.readback, &array.data, op)?)
    }
}

impl ArrayBackend for DeviceBackend {
    type Array = DeviceArray;

    fn name(&self) -> &'static str {
        "device"
    }

    fn is_device(&self) -> bool {
        true
    }

    fn to_backend(&self, host: Array3<f32>) -> Result<Self::Array, BackendError> {
        let shape: [usize; 3] = host.dim().into();
        let contiguous = host.as_standard_layout();
        let values = contiguous.as_slice().ok_or_else(|| {
            BackendError::Device("standard-layout array is not contiguous".into())
        })?;
        let data = TrackedBuffer::upload(&self.ctx, "voxform_volume", values)?;
        debug!(?shape, bytes = data.byte_size(), "uploaded volume");
        Ok(DeviceArray { data, shape })
    }

    fn to_host(&self, array: &Self::Array) -> Result<Array3<f32>, BackendError> {
        let values = self
            .readback
            .read_f32(&self.ctx, &array.data.buffer, 0, array.len())?;
        let [x, y, z] = array.shape;
        let actual = values.len();
        Array3::from_shape_vec((x, y, z), values).map_err(|_| BackendError::ShapeMismatch {
            expected: x * y * z,
            actual,
        })
    }

    fn normalize_to_host(&self, array: Self::Array) -> Result<Array3<f32>, BackendError> {
        self.synchronize()?;
        self.to_host(&array)
    }

    fn shape(&self, array: &Self::Array) -> [usize; 3] {
        array.shape
    }

    fn clip(&self, array: Self::Array, low: f32, high: f32) -> Result<Self::Array, BackendError> {
        check_bounds("clip", low, high)?;
        self.elementwise.clip(&self.ctx, &array.data, low, high);
        Ok(array)
    }

    fn percentile(&self, array: &Self::Array, p: f64) -> Result<f64, BackendError> {
        let rank = PercentileRank::new(array.len(), p)?;
        let sorted = self.sort.sorted_copy(&self.ctx, &array.data)?;
        let count = rank.upper - rank.lower + 1;
        let values = self
            .readback
            .read_f32(&self.ctx, &sorted.buffer, rank.lower, count)?;
        match values.as_slice() {
            [lower] => Ok(rank.interpolate(*lower, *lower)),
            [lower, upper] => Ok(rank.interpolate(*lower, *upper)),
            other => Err(BackendError::ShapeMismatch {
                expected: count,
                actual: other.len(),
            }),
        }
    }

    fn min(&self, array: &Self::Array) -> Result<f32, BackendError> {
        self.extremum(array, ReduceOp::Min)
    }

    fn max(&self, array: &Self::Array) -> Result<f32, BackendError> {
        self.extremum(array, ReduceOp::Max)
    }

    fn repeat(
        &self,
        array: &Self::Array,
        count: usize,
        axis: Axis,
    ) -> Result<Self::Array, BackendError> {
        if count == 0 {
            return Err(BackendError::InvalidArgument(
                "repeat count must be at least 1".into(),
            ));
        }
        let axis = axis.index();
        if axis > 2 {
            return Err(BackendError::InvalidArgument(format!(
                "axis {axis} out of range for a 3D array"
            )));
        }
        let data = self
            .elementwise
            .tile(&self.ctx, &array.data, array.shape, count, axis)?;
        let mut shape = array.shape;
        shape[axis] *= count;
        Ok(DeviceArray { data, shape })
    }

    fn rescale(
        &self,
        array: Self::Array,
        low: f32,
        high: f32,
    ) -> Result<Self::Array, BackendError> {
        check_bounds("rescale", low, high)?;
        if low == high {
            return Err(BackendError::InvalidArgument(format!(
                "rescale needs a non-empty range, got [{low}, {high}]"
            )));
        }
        self.elementwise.rescale(&self.ctx, &array.data, low, high);
        Ok(array)
    }

    fn synchronize(&self) -> Result<(), BackendError> {
        Ok(self.ctx.wait_idle()?)
    }
}
