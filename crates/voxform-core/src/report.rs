//! Human-readable and JSON run reports.

use std::fmt;

use serde::Serialize;

use crate::params::PipelineParameters;
use crate::telemetry::{RunSummary, StageRecord, TelemetrySnapshot};
use crate::transform::NormalizationBounds;
use crate::volume::VolumeProperties;

/// Everything a finished run produced besides the output volume.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub backend: &'static str,
    pub input: String,
    pub output: String,
    pub parameters: PipelineParameters,
    /// Process usage before the first stage.
    pub baseline: TelemetrySnapshot,
    pub properties: VolumeProperties,
    pub normalization: NormalizationBounds,
    pub stages: Vec<StageRecord>,
    pub summary: RunSummary,
}

impl RunReport {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = &self.properties;
        writeln!(f, "Voxform run ({} backend)", self.backend)?;
        writeln!(f, "  input:  {}", self.input)?;
        writeln!(f, "  output: {}", self.output)?;
        writeln!(
            f,
            "  multiplier: {}, scale factor: {}",
            self.parameters.multiplier(),
            self.parameters.scale_factor()
        )?;

        writeln!(f, "\nVolume:")?;
        let [x, y, z] = p.original_dims;
        writeln!(f, "  Original dimensions (x, y, z): ({x}, {y}, {z})")?;
        let [vx, vy, vz] = p.voxel_size_mm;
        writeln!(f, "  Voxel size (mm): ({vx:.3}, {vy:.3}, {vz:.3})")?;
        writeln!(f, "  Total slices after expansion: {}", p.expanded_slices)?;
        let [sx, sy] = p.scaled_dims;
        writeln!(f, "  Scaled dimensions (x, y): ({sx}, {sy})")?;
        writeln!(f, "  Data type: {}", p.data_type)?;
        writeln!(f, "  Estimated expanded size: {:.2} MB", p.estimated_size_mb)?;
        writeln!(
            f,
            "  Normalization window: [{}, {}]",
            self.normalization.lower_percentile, self.normalization.upper_percentile
        )?;

        writeln!(
            f,
            "\nBefore start - Memory Usage: {:.2} MB, CPU Usage: {:.1}%",
            self.baseline.memory_mb, self.baseline.cpu_percent
        )?;

        writeln!(f, "\nStages:")?;
        for r in &self.stages {
            write!(
                f,
                "  {:<10} {:>9.4} s  memory {:>+9.2} MB  cpu {:>+7.1}%",
                r.stage.label(),
                r.duration_secs,
                r.memory_delta_mb,
                r.cpu_delta_percent
            )?;
            if r.transfer_secs > 0.0 {
                write!(f, "  transfer {:.4} s", r.transfer_secs)?;
            }
            if let Some(device) = &r.device {
                match device.utilization_percent {
                    Some(util) => write!(f, "  device {util:.0}%")?,
                    None => write!(f, "  device n/a")?,
                }
                write!(f, " | {:.2} MB", device.memory_used_mb)?;
            }
            writeln!(f)?;
        }

        let s = &self.summary;
        writeln!(f, "\nWeighted Average Memory Usage: {:.2} MB", s.weighted_memory_mb)?;
        writeln!(f, "Weighted Average CPU Usage: {:.2}%", s.weighted_cpu_percent)?;

        writeln!(f, "\nSummary of Timings:")?;
        for t in &s.stage_timings {
            writeln!(f, "  {}: {:.4} seconds", t.stage.label(), t.secs)?;
        }
        writeln!(f, "  host/device transfers: {:.4} seconds", s.transfer_secs)?;
        writeln!(
            f,
            "  CPU sampling windows: {:.4} seconds (measurement artifact, included in stage times)",
            s.sampling_overhead_secs
        )?;
        writeln!(f, "\nTotal stage time: {:.4} seconds", s.total_stage_secs)?;
        write!(f, "Total Execution Time: {:.4} seconds", s.total_elapsed_secs)
    }
}
