//! Timed stage execution with before/after resource deltas.

use std::fmt;
use std::time::{Duration, Instant};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use super::sampler::{DeviceSnapshot, TelemetrySnapshot, TelemetrySource};
use crate::backend::ArrayBackend;
use crate::error::{BackendError, PipelineError, StageFailure};

/// Pipeline stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    Load,
    Resample,
    Expand,
    Normalize,
    Smooth,
    Save,
}

impl StageName {
    /// Every stage, in execution order.
    pub const ALL: [StageName; 6] = [
        Self::Load,
        Self::Resample,
        Self::Expand,
        Self::Normalize,
        Self::Smooth,
        Self::Save,
    ];

    pub const fn label(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Resample => "resample",
            Self::Expand => "expand",
            Self::Normalize => "normalize",
            Self::Smooth => "smooth",
            Self::Save => "save",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Measurements for one completed stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageName,
    /// Wall-clock seconds, including both sampling windows.
    pub duration_secs: f64,
    /// RSS after minus RSS before, in MB.
    pub memory_delta_mb: f64,
    /// CPU utilization after minus before, in percent.
    pub cpu_delta_percent: f64,
    /// Seconds spent moving data between host and device inside the stage.
    pub transfer_secs: f64,
    /// Seconds spent inside CPU sampling windows.
    pub sampling_secs: f64,
    /// Device usage at stage end, when a device probe is attached.
    pub device: Option<DeviceSnapshot>,
}

impl StageRecord {
    /// Stage time not spent in sampling windows.
    pub fn processing_secs(&self) -> f64 {
        (self.duration_secs - self.sampling_secs).max(0.0)
    }
}

/// Append-only, ordered record of a run's stages.
#[derive(Debug, Clone, Default)]
pub struct StageLog {
    records: Vec<StageRecord>,
}

impl StageLog {
    pub fn push(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Handle passed to a stage body for explicit host/device transfers.
///
/// Every transfer made through the scope is timed and lands in the stage's
/// [`StageRecord::transfer_secs`].
#[derive(Debug, Default)]
pub struct StageScope {
    transfer: Duration,
}

impl StageScope {
    /// Move a host array into the backend.
    pub fn upload<B: ArrayBackend>(
        &mut self,
        backend: &B,
        host: Array3<f32>,
    ) -> Result<B::Array, BackendError> {
        let started = Instant::now();
        let array = backend.to_backend(host)?;
        self.note_transfer("host -> backend", backend, started);
        Ok(array)
    }

    /// Move a backend array out to the host.
    pub fn download<B: ArrayBackend>(
        &mut self,
        backend: &B,
        array: B::Array,
    ) -> Result<Array3<f32>, BackendError> {
        let started = Instant::now();
        let host = backend.normalize_to_host(array)?;
        self.note_transfer("backend -> host", backend, started);
        Ok(host)
    }

    /// Run a host-only primitive on a backend array: download, apply, upload.
    pub fn on_host<B: ArrayBackend>(
        &mut self,
        backend: &B,
        array: B::Array,
        f: impl FnOnce(Array3<f32>) -> Array3<f32>,
    ) -> Result<B::Array, BackendError> {
        let host = self.download(backend, array)?;
        let result = f(host);
        self.upload(backend, result)
    }

    pub fn transfer_time(&self) -> Duration {
        self.transfer
    }

    fn note_transfer<B: ArrayBackend>(&mut self, direction: &str, backend: &B, started: Instant) {
        let elapsed = started.elapsed();
        self.transfer += elapsed;
        debug!(
            direction,
            backend = backend.name(),
            secs = elapsed.as_secs_f64(),
            "transfer"
        );
    }
}

/// Runs stages one at a time, sampling telemetry around each.
pub struct StageRunner<'s, S: TelemetrySource + ?Sized> {
    source: &'s mut S,
    run_started: Instant,
}

impl<'s, S: TelemetrySource + ?Sized> StageRunner<'s, S> {
    pub fn new(source: &'s mut S, run_started: Instant) -> Self {
        Self {
            source,
            run_started,
        }
    }

    /// Execute `body` as `stage`.
    ///
    /// The backend is synchronized before the closing snapshot so the
    /// record reflects completed work. Any failure is returned with the
    /// stage name and the run time elapsed so far.
    pub fn run_stage<B, T, F>(
        &mut self,
        stage: StageName,
        backend: &B,
        body: F,
    ) -> Result<(T, StageRecord), PipelineError>
    where
        B: ArrayBackend,
        F: FnOnce(&mut StageScope) -> Result<T, StageFailure>,
    {
        let _span = info_span!("stage", stage = %stage).entered();
        info!("stage started");

        let started = Instant::now();
        let before = self.source.snapshot();
        let mut sampling = started.elapsed();

        let mut scope = StageScope::default();
        let outcome = body(&mut scope).and_then(|value| {
            backend.synchronize()?;
            Ok(value)
        });
        let value = outcome.map_err(|source| PipelineError::Stage {
            stage,
            elapsed: self.run_started.elapsed(),
            source,
        })?;

        let sample_started = Instant::now();
        let after = self.source.snapshot();
        sampling += sample_started.elapsed();
        let duration = started.elapsed();

        let record = build_record(stage, duration, sampling, scope.transfer, &before, &after);
        info!(
            duration_secs = record.duration_secs,
            memory_delta_mb = record.memory_delta_mb,
            cpu_delta_percent = record.cpu_delta_percent,
            transfer_secs = record.transfer_secs,
            "stage finished"
        );
        if let Some(device) = &record.device {
            info!(
                utilization_percent = device.utilization_percent,
                memory_used_mb = device.memory_used_mb,
                "device usage"
            );
        }
        Ok((value, record))
    }
}

fn build_record(
    stage: StageName,
    duration: Duration,
    sampling: Duration,
    transfer: Duration,
    before: &TelemetrySnapshot,
    after: &TelemetrySnapshot,
) -> StageRecord {
    StageRecord {
        stage,
        duration_secs: duration.as_secs_f64(),
        memory_delta_mb: after.memory_mb - before.memory_mb,
        cpu_delta_percent: after.cpu_percent - before.cpu_percent,
        transfer_secs: transfer.as_secs_f64(),
        sampling_secs: sampling.as_secs_f64(),
        device: after.device,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::HostBackend;
    use crate::error::TransformError;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<TelemetrySnapshot>);

    impl Scripted {
        fn new(samples: &[(f64, f64)]) -> Self {
            Self(
                samples
                    .iter()
                    .map(|&(memory_mb, cpu_percent)| TelemetrySnapshot {
                        memory_mb,
                        cpu_percent,
                        device: None,
                    })
                    .collect(),
            )
        }
    }

    impl TelemetrySource for Scripted {
        fn snapshot(&mut self) -> TelemetrySnapshot {
            self.0.pop_front().expect("scripted samples exhausted")
        }
    }

    #[test]
    fn test_record_holds_before_after_delta() {
        let mut source = Scripted::new(&[(100.0, 10.0), (160.0, 4.0)]);
        let mut runner = StageRunner::new(&mut source, Instant::now());
        let (value, record) = runner
            .run_stage(StageName::Normalize, &HostBackend, |_| Ok(7))
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(record.stage, StageName::Normalize);
        assert_eq!(record.memory_delta_mb, 60.0);
        assert_eq!(record.cpu_delta_percent, -6.0);
        assert!(record.duration_secs >= record.sampling_secs);
        assert!(record.duration_secs >= 0.0);
    }

    #[test]
    fn test_failure_carries_stage_context() {
        let mut source = Scripted::new(&[(0.0, 0.0)]);
        let mut runner = StageRunner::new(&mut source, Instant::now());
        let err = runner
            .run_stage(StageName::Normalize, &HostBackend, |_| -> Result<(), _> {
                Err(TransformError::DegenerateRange {
                    low: 1.0,
                    high: 1.0,
                }
                .into())
            })
            .unwrap_err();
        assert_eq!(err.stage(), Some(StageName::Normalize));
        assert!(err.to_string().contains("normalize"), "{err}");
    }

    #[test]
    fn test_scope_times_round_trip_transfers() {
        let mut source = Scripted::new(&[(0.0, 0.0), (0.0, 0.0)]);
        let mut runner = StageRunner::new(&mut source, Instant::now());
        let (out, record) = runner
            .run_stage(StageName::Smooth, &HostBackend, |scope| {
                let data = Array3::<f32>::ones((2, 2, 2));
                Ok(scope.on_host(&HostBackend, data, |host| host * 2.0)?)
            })
            .unwrap();
        assert!(out.iter().all(|&v| v == 2.0));
        assert!(record.transfer_secs >= 0.0);
        assert!(record.transfer_secs <= record.duration_secs);
    }

    #[test]
    fn test_stage_labels_follow_execution_order() {
        let labels: Vec<&str> = StageName::ALL.iter().map(StageName::label).collect();
        assert_eq!(
            labels,
            ["load", "resample", "expand", "normalize", "smooth", "save"]
        );
    }
}
