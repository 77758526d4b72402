//! Command-line arguments and the run configuration built from them.

use std::num::NonZeroU32;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use voxform_core::error::ConfigError;
use voxform_core::{PipelineParameters, TelemetryConfig};

/// Resample, expand, normalize and smooth a NIfTI volume, reporting
/// per-stage resource usage.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Input volume (.nii or .nii.gz).
    pub input: PathBuf,

    /// Output volume; missing parent directories are created.
    pub output: PathBuf,

    /// Tile the slice axis this many times.
    #[arg(short, long, default_value_t = 1)]
    pub multiplier: u32,

    /// In-plane resampling factor (>= 1).
    #[arg(short, long, default_value_t = 1.0)]
    pub scale_factor: f64,

    /// Run the array operations on the GPU.
    #[arg(long)]
    pub gpu: bool,

    /// With --gpu, run on the CPU when no compute device is available.
    #[arg(long, requires = "gpu")]
    pub fallback_to_host: bool,

    /// CPU sampling window in milliseconds. Defaults to
    /// $VOXFORM_CPU_SAMPLE_MS, or 2000.
    #[arg(long)]
    pub cpu_sample_ms: Option<u64>,

    /// Leave device utilization out of stage records.
    #[arg(long)]
    pub no_device_telemetry: bool,

    /// Also write the run report as JSON to this path.
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}

/// Validated configuration for one invocation.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub params: PipelineParameters,
    pub telemetry: TelemetryConfig,
    pub fallback_to_host: bool,
    pub report_json: Option<PathBuf>,
}

impl TryFrom<Cli> for AppConfig {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let multiplier =
            NonZeroU32::new(cli.multiplier).ok_or(ConfigError::Multiplier(cli.multiplier))?;
        let params = PipelineParameters::new(multiplier, cli.scale_factor, cli.gpu)?;

        let mut telemetry = match cli.cpu_sample_ms {
            Some(ms) => TelemetryConfig::with_interval(Duration::from_millis(ms))?,
            None => TelemetryConfig::default(),
        };
        if cli.no_device_telemetry {
            telemetry = telemetry.without_device();
        }

        Ok(Self {
            input: cli.input,
            output: cli.output,
            params,
            telemetry,
            fallback_to_host: cli.fallback_to_host,
            report_json: cli.report_json,
        })
    }
}
