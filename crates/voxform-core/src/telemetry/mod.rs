//! Stage telemetry: sampling, timed stage execution and run aggregation.

pub mod aggregate;
pub mod sampler;
pub mod stage;

pub use aggregate::{RunSummary, StageTiming, TelemetryAggregator, weighted_average};
pub use sampler::{
    DeviceProbe, DeviceSnapshot, TelemetryConfig, TelemetrySampler, TelemetrySnapshot,
    TelemetrySource,
};
pub use stage::{StageLog, StageName, StageRecord, StageRunner, StageScope};
