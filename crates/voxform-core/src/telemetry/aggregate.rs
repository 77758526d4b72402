//! Duration-weighted run summaries.

use std::time::Duration;

use serde::Serialize;

use super::stage::{StageLog, StageName, StageRecord};
use crate::error::TelemetryError;

/// Duration of one stage, for the timing summary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StageTiming {
    pub stage: StageName,
    pub secs: f64,
}

/// Whole-run figures derived from the stage log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Memory delta averaged over stages, weighted by stage duration (MB).
    pub weighted_memory_mb: f64,
    /// CPU delta averaged over stages, weighted by stage duration (%).
    pub weighted_cpu_percent: f64,
    /// Stage durations in execution order.
    pub stage_timings: Vec<StageTiming>,
    /// Sum of stage durations.
    pub total_stage_secs: f64,
    /// Portion of `total_stage_secs` spent in CPU sampling windows.
    pub sampling_overhead_secs: f64,
    /// Portion of `total_stage_secs` spent on host/device transfers.
    pub transfer_secs: f64,
    /// Wall-clock time of the whole run, including work between stages.
    pub total_elapsed_secs: f64,
}

/// Duration-weighted mean of `metric` over `records`.
///
/// Fails with [`TelemetryError::NoStagesRecorded`] when the total duration
/// is zero.
pub fn weighted_average(
    records: &[StageRecord],
    metric: impl Fn(&StageRecord) -> f64,
) -> Result<f64, TelemetryError> {
    let total: f64 = records.iter().map(|r| r.duration_secs).sum();
    if records.is_empty() || total <= 0.0 {
        return Err(TelemetryError::NoStagesRecorded);
    }
    let weighted: f64 = records.iter().map(|r| metric(r) * r.duration_secs).sum();
    Ok(weighted / total)
}

/// Computes a [`RunSummary`] from a finished run's stage log.
pub struct TelemetryAggregator;

impl TelemetryAggregator {
    pub fn summarize(log: &StageLog, total_elapsed: Duration) -> Result<RunSummary, TelemetryError> {
        let records = log.records();
        let weighted_memory_mb = weighted_average(records, |r| r.memory_delta_mb)?;
        let weighted_cpu_percent = weighted_average(records, |r| r.cpu_delta_percent)?;
        Ok(RunSummary {
            weighted_memory_mb,
            weighted_cpu_percent,
            stage_timings: records
                .iter()
                .map(|r| StageTiming {
                    stage: r.stage,
                    secs: r.duration_secs,
                })
                .collect(),
            total_stage_secs: records.iter().map(|r| r.duration_secs).sum(),
            sampling_overhead_secs: records.iter().map(|r| r.sampling_secs).sum(),
            transfer_secs: records.iter().map(|r| r.transfer_secs).sum(),
            total_elapsed_secs: total_elapsed.as_secs_f64(),
        })
    }
}
