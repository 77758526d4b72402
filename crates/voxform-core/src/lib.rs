//! Voxform Core: domain layer for volumetric transforms.
//!
//! This crate contains the volume model, the array backend abstraction with
//! its host implementation, the transform math, and stage telemetry. No GPU
//! or file-format dependencies.

pub mod backend;
pub mod error;
pub mod params;
pub mod pipeline;
pub mod report;
pub mod store;
pub mod telemetry;
pub mod transform;
pub mod volume;

// Re-exports for convenience.
pub use backend::{ArrayBackend, HostBackend};
pub use error::{
    BackendError, ConfigError, PipelineError, StageFailure, StoreError, TelemetryError,
    TransformError,
};
pub use params::PipelineParameters;
pub use pipeline::TransformPipeline;
pub use report::RunReport;
pub use store::{HostVolume, VolumeStore};
pub use telemetry::{StageName, TelemetryConfig, TelemetrySampler};
pub use volume::{Affine, Volume, VolumeProperties};
