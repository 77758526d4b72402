//! Voxform: resample, expand, normalize and smooth a NIfTI volume.
//!
//! Runs the core pipeline on the host or a wgpu device, prints the run
//! report to stdout and optionally writes it as JSON.

mod config;
mod logging;

use std::fs;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::{error, warn};
use voxform_core::telemetry::DeviceProbe;
use voxform_core::{ArrayBackend, HostBackend, RunReport, TelemetrySampler, TransformPipeline};
use voxform_gpu::DeviceBackend;
use voxform_nifti::NiftiStore;

use crate::config::{AppConfig, Cli};

fn main() -> ExitCode {
    if let Err(err) = logging::init_tracing() {
        eprintln!("warning: {err}");
    }
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> anyhow::Result<()> {
    let config = AppConfig::try_from(Cli::parse()).context("invalid arguments")?;

    let report = if config.params.use_device() {
        match DeviceBackend::new() {
            Ok(backend) => {
                let probe: Box<dyn DeviceProbe> = Box::new(backend.probe());
                execute(&backend, &config, Some(probe))?
            }
            Err(err) if config.fallback_to_host => {
                warn!(error = %err, "compute device unavailable, falling back to host backend");
                execute(&HostBackend, &config, None)?
            }
            Err(err) => {
                return Err(err)
                    .context("cannot run on the GPU (pass --fallback-to-host to use the CPU)");
            }
        }
    } else {
        execute(&HostBackend, &config, None)?
    };

    println!("{report}");
    if let Some(path) = &config.report_json {
        let json = report.to_json_pretty().context("serializing run report")?;
        fs::write(path, json)
            .with_context(|| format!("writing JSON report to {}", path.display()))?;
    }
    Ok(())
}

/// Run the pipeline once on `backend`.
fn execute<B: ArrayBackend>(
    backend: &B,
    config: &AppConfig,
    probe: Option<Box<dyn DeviceProbe>>,
) -> anyhow::Result<RunReport> {
    let mut sampler = TelemetrySampler::new(config.telemetry)?;
    if let Some(probe) = probe {
        sampler = sampler.with_device_probe(probe);
    }

    let pipeline = TransformPipeline::new(backend, config.params);
    let report = pipeline
        .run(
            &NiftiStore::new(),
            &mut sampler,
            &config.input,
            &config.output,
        )
        .with_context(|| format!("processing {}", config.input.display()))?;
    Ok(report)
}
