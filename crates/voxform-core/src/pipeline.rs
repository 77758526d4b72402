//! The ordered stage sequence: load → resample → expand → normalize → smooth → save.

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

use crate::backend::ArrayBackend;
use crate::error::PipelineError;
use crate::params::PipelineParameters;
use crate::report::RunReport;
use crate::store::VolumeStore;
use crate::telemetry::{StageLog, StageName, StageRunner, TelemetryAggregator, TelemetrySource};
use crate::transform::{
    SMOOTHING_SIGMA, expand_slices, gaussian_filter, normalize_intensities, resample_in_plane,
};
use crate::volume::{Volume, VolumeProperties};

/// Runs one volume through every stage on a single backend.
///
/// The backend is fixed when the pipeline is built; every intermediate array
/// is a `B::Array`.
pub struct TransformPipeline<'b, B: ArrayBackend> {
    backend: &'b B,
    params: PipelineParameters,
}

impl<'b, B: ArrayBackend> TransformPipeline<'b, B> {
    pub fn new(backend: &'b B, params: PipelineParameters) -> Self {
        Self { backend, params }
    }

    pub fn params(&self) -> &PipelineParameters {
        &self.params
    }

    /// Transform the volume at `input` and write it to `output`.
    ///
    /// Nothing is written unless every earlier stage succeeded.
    pub fn run<V, S>(
        &self,
        store: &V,
        telemetry: &mut S,
        input: &Path,
        output: &Path,
    ) -> Result<RunReport, PipelineError>
    where
        V: VolumeStore,
        S: TelemetrySource + ?Sized,
    {
        let backend = self.backend;
        let params = self.params;
        let run_started = Instant::now();

        let baseline = telemetry.snapshot();
        info!(
            backend = backend.name(),
            memory_mb = baseline.memory_mb,
            cpu_percent = baseline.cpu_percent,
            "before start"
        );

        let mut log = StageLog::default();
        let mut runner = StageRunner::new(telemetry, run_started);

        let (volume, record) = runner.run_stage(StageName::Load, backend, |scope| {
            let volume = store.load(input)?;
            Ok(volume.try_map_data(|data| scope.upload(backend, data))?)
        })?;
        log.push(record);

        let properties =
            VolumeProperties::describe(backend.shape(&volume.data), &volume.affine, &params);
        info!(
            original_dims = ?properties.original_dims,
            voxel_size_mm = ?properties.voxel_size_mm,
            expanded_slices = properties.expanded_slices,
            scaled_dims = ?properties.scaled_dims,
            data_type = properties.data_type,
            estimated_size_mb = properties.estimated_size_mb,
            "volume properties"
        );

        let (volume, record) = runner.run_stage(StageName::Resample, backend, |scope| {
            if !params.resamples() {
                debug!("scale factor is 1, resampling skipped");
                return Ok(volume);
            }
            let scale = params.scale_factor();
            Ok(volume.try_map_data(|data| {
                scope.on_host(backend, data, |host| resample_in_plane(&host, scale))
            })?)
        })?;
        log.push(record);

        let (volume, record) = runner.run_stage(StageName::Expand, backend, |_| {
            Ok(volume.try_map_data(|data| expand_slices(backend, data, params.multiplier()))?)
        })?;
        log.push(record);

        let ((volume, bounds), record) = runner.run_stage(StageName::Normalize, backend, |_| {
            let Volume {
                data,
                affine,
                header,
            } = volume;
            let (data, bounds) = normalize_intensities(backend, data)?;
            Ok((Volume::new(data, affine, header), bounds))
        })?;
        log.push(record);

        let (volume, record) = runner.run_stage(StageName::Smooth, backend, |scope| {
            Ok(volume.try_map_data(|data| {
                scope.on_host(backend, data, |host| gaussian_filter(&host, SMOOTHING_SIGMA))
            })?)
        })?;
        log.push(record);

        let ((), record) = runner.run_stage(StageName::Save, backend, |scope| {
            let host = volume.try_map_data(|data| scope.download(backend, data))?;
            store.save(&host, output)?;
            Ok(())
        })?;
        log.push(record);

        let summary = TelemetryAggregator::summarize(&log, run_started.elapsed())?;
        info!(
            weighted_memory_mb = summary.weighted_memory_mb,
            weighted_cpu_percent = summary.weighted_cpu_percent,
            total_elapsed_secs = summary.total_elapsed_secs,
            "run finished"
        );

        Ok(RunReport {
            backend: backend.name(),
            input: input.display().to_string(),
            output: output.display().to_string(),
            parameters: params,
            baseline,
            properties,
            normalization: bounds,
            stages: log.records().to_vec(),
            summary,
        })
    }
}
