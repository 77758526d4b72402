//! Error taxonomy shared by the pipeline crates.

use std::path::PathBuf;
use std::time::Duration;

use crate::telemetry::StageName;

/// Failures raised by an [`ArrayBackend`](crate::backend::ArrayBackend).
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("device error: {0}")]
    Device(String),
    #[error("operation `{0}` requires a non-empty array")]
    EmptyArray(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

/// Failures raised while opening or persisting a volume.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("volume not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("cannot parse volume {}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by the numeric transform stages.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("intensity range collapsed after clipping: min = max = {low}")]
    DegenerateRange { low: f32, high: f32 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Failures raised while sampling or aggregating telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("no stages recorded: cannot compute duration-weighted averages")]
    NoStagesRecorded,
    #[error("current process is not observable: {0}")]
    ProcessUnavailable(String),
}

/// Invalid run configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("multiplier must be at least 1, got {0}")]
    Multiplier(u32),
    #[error("scale factor must be a finite value >= 1, got {0}")]
    ScaleFactor(f64),
    #[error("CPU sampling interval must be non-zero")]
    ZeroSampleInterval,
}

/// The error that ended a stage, before stage context is attached.
#[derive(Debug, thiserror::Error)]
pub enum StageFailure {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

/// A fatal pipeline error.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("stage `{stage}` failed after {:.3}s of run time: {source}", .elapsed.as_secs_f64())]
    Stage {
        stage: StageName,
        elapsed: Duration,
        #[source]
        source: StageFailure,
    },
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl PipelineError {
    /// The stage that failed, if the error came from a stage body.
    pub fn stage(&self) -> Option<StageName> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            Self::Telemetry(_) => None,
        }
    }
}
