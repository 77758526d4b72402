//! Point-in-time process and device resource sampling.

use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sysinfo::{Pid, System};
use tracing::warn;

use crate::error::{ConfigError, TelemetryError};
use crate::volume::BYTES_PER_MB;

/// Default CPU sampling window.
const DEFAULT_CPU_SAMPLE_MS: u64 = 2000;

/// Overrides the default sampling window, in milliseconds.
pub const CPU_SAMPLE_ENV: &str = "VOXFORM_CPU_SAMPLE_MS";

/// Sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// How long each snapshot observes the process to measure CPU use.
    ///
    /// A zero-length window gives a meaningless instantaneous 0% reading.
    /// The window is spent inside every stage twice, so stage durations
    /// include it; reports call it out as sampling overhead.
    pub cpu_sample_interval: Duration,
    /// Attach device readings to snapshots when a probe is available.
    pub sample_device: bool,
}

impl TelemetryConfig {
    pub fn with_interval(cpu_sample_interval: Duration) -> Result<Self, ConfigError> {
        if cpu_sample_interval.is_zero() {
            return Err(ConfigError::ZeroSampleInterval);
        }
        Ok(Self {
            cpu_sample_interval,
            sample_device: true,
        })
    }

    pub fn without_device(mut self) -> Self {
        self.sample_device = false;
        self
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        let raw = std::env::var_os(CPU_SAMPLE_ENV);
        let ms = sample_ms_or_default(raw.as_ref().map(|v| v.to_string_lossy()).as_deref());
        Self {
            cpu_sample_interval: Duration::from_millis(ms),
            sample_device: true,
        }
    }
}

/// Parse an override of the sampling window, falling back to the default
/// with a warning when it is set but unusable.
fn sample_ms_or_default(raw: Option<&str>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_CPU_SAMPLE_MS;
    };
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => ms,
        _ => {
            warn!(
                value = raw,
                default_ms = DEFAULT_CPU_SAMPLE_MS,
                "ignoring invalid {CPU_SAMPLE_ENV}"
            );
            DEFAULT_CPU_SAMPLE_MS
        }
    }
}

/// Device utilization at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    /// Busy percentage, when the driver exposes it.
    pub utilization_percent: Option<f64>,
    /// Device memory in use, in MB.
    pub memory_used_mb: f64,
}

/// Process resource usage at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    /// Resident set size in MB.
    pub memory_mb: f64,
    /// Process CPU utilization over the sampling window, in percent of one core.
    pub cpu_percent: f64,
    pub device: Option<DeviceSnapshot>,
}

/// Anything that can produce [`TelemetrySnapshot`]s.
pub trait TelemetrySource {
    fn snapshot(&mut self) -> TelemetrySnapshot;
}

/// Reports device-side usage for the active accelerator.
pub trait DeviceProbe {
    fn sample(&mut self) -> Option<DeviceSnapshot>;
}

/// Samples the current process through `sysinfo`.
pub struct TelemetrySampler {
    system: System,
    pid: Pid,
    interval: Duration,
    sample_device: bool,
    device: Option<Box<dyn DeviceProbe>>,
}

impl TelemetrySampler {
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let pid = sysinfo::get_current_pid()
            .map_err(|reason| TelemetryError::ProcessUnavailable(reason.to_string()))?;
        let mut system = System::new();
        if !system.refresh_process(pid) {
            return Err(TelemetryError::ProcessUnavailable(format!(
                "process {pid} is not listed by the OS"
            )));
        }
        Ok(Self {
            system,
            pid,
            interval: config.cpu_sample_interval,
            sample_device: config.sample_device,
            device: None,
        })
    }

    /// Attach a probe for the active accelerator. Ignored when the config
    /// disabled device sampling.
    pub fn with_device_probe(mut self, probe: Box<dyn DeviceProbe>) -> Self {
        self.device = Some(probe);
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl TelemetrySource for TelemetrySampler {
    fn snapshot(&mut self) -> TelemetrySnapshot {
        self.system.refresh_cpu();
        self.system.refresh_process(self.pid);
        thread::sleep(self.interval);
        self.system.refresh_cpu();
        self.system.refresh_process(self.pid);

        let (memory_mb, cpu_percent) = self
            .system
            .process(self.pid)
            .map(|p| (p.memory() as f64 / BYTES_PER_MB, p.cpu_usage() as f64))
            .unwrap_or((0.0, 0.0));

        TelemetrySnapshot {
            memory_mb,
            cpu_percent,
            device: match &mut self.device {
                Some(probe) if self.sample_device => probe.sample(),
                _ => None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_override_falls_back_on_bad_values() {
        assert_eq!(sample_ms_or_default(None), DEFAULT_CPU_SAMPLE_MS);
        assert_eq!(sample_ms_or_default(Some("250")), 250);
        assert_eq!(sample_ms_or_default(Some(" 40 ")), 40);
        assert_eq!(sample_ms_or_default(Some("0")), DEFAULT_CPU_SAMPLE_MS);
        assert_eq!(sample_ms_or_default(Some("fast")), DEFAULT_CPU_SAMPLE_MS);
        assert_eq!(sample_ms_or_default(Some("-5")), DEFAULT_CPU_SAMPLE_MS);
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        assert!(matches!(
            TelemetryConfig::with_interval(Duration::ZERO),
            Err(ConfigError::ZeroSampleInterval)
        ));
    }

    #[test]
    fn test_sampler_reports_resident_memory() {
        let config = TelemetryConfig::with_interval(Duration::from_millis(50)).unwrap();
        let mut sampler = TelemetrySampler::new(config).unwrap();
        let snapshot = sampler.snapshot();
        assert!(snapshot.memory_mb > 0.0, "rss = {}", snapshot.memory_mb);
        assert!(snapshot.cpu_percent >= 0.0);
        assert!(snapshot.device.is_none());
    }

    struct FixedProbe;

    impl DeviceProbe for FixedProbe {
        fn sample(&mut self) -> Option<DeviceSnapshot> {
            Some(DeviceSnapshot {
                utilization_percent: Some(40.0),
                memory_used_mb: 128.0,
            })
        }
    }

    #[test]
    fn test_device_probe_is_sampled() {
        let config = TelemetryConfig::with_interval(Duration::from_millis(10)).unwrap();
        let mut sampler = TelemetrySampler::new(config)
            .unwrap()
            .with_device_probe(Box::new(FixedProbe));
        let device = sampler.snapshot().device.expect("probe attached");
        assert_eq!(device.memory_used_mb, 128.0);
    }

    #[test]
    fn test_device_sampling_can_be_disabled() {
        let config = TelemetryConfig::with_interval(Duration::from_millis(10))
            .unwrap()
            .without_device();
        let mut sampler = TelemetrySampler::new(config)
            .unwrap()
            .with_device_probe(Box::new(FixedProbe));
        assert!(sampler.snapshot().device.is_none());
    }
}
