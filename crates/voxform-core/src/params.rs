//! Run parameters that drive the transform stages.

use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Immutable configuration for one pipeline run.
///
/// Both transform parameters default to 1, which turns expansion and
/// resampling into no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawParameters", into = "RawParameters")]
pub struct PipelineParameters {
    multiplier: NonZeroU32,
    scale_factor: f64,
    use_device: bool,
}

impl PipelineParameters {
    pub fn new(
        multiplier: NonZeroU32,
        scale_factor: f64,
        use_device: bool,
    ) -> Result<Self, ConfigError> {
        if !scale_factor.is_finite() || scale_factor < 1.0 {
            return Err(ConfigError::ScaleFactor(scale_factor));
        }
        Ok(Self {
            multiplier,
            scale_factor,
            use_device,
        })
    }

    /// Slice-expansion factor.
    pub fn multiplier(&self) -> NonZeroU32 {
        self.multiplier
    }

    /// In-plane resampling factor.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Whether the run asked for the device backend.
    pub fn use_device(&self) -> bool {
        self.use_device
    }

    pub fn expands(&self) -> bool {
        self.multiplier.get() > 1
    }

    pub fn resamples(&self) -> bool {
        self.scale_factor != 1.0
    }
}

impl Default for PipelineParameters {
    fn default() -> Self {
        Self {
            multiplier: NonZeroU32::MIN,
            scale_factor: 1.0,
            use_device: false,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawParameters {
    multiplier: u32,
    scale_factor: f64,
    #[serde(default)]
    use_device: bool,
}

impl TryFrom<RawParameters> for PipelineParameters {
    type Error = ConfigError;

    fn try_from(raw: RawParameters) -> Result<Self, Self::Error> {
        let multiplier =
            NonZeroU32::new(raw.multiplier).ok_or(ConfigError::Multiplier(raw.multiplier))?;
        Self::new(multiplier, raw.scale_factor, raw.use_device)
    }
}

impl From<PipelineParameters> for RawParameters {
    fn from(params: PipelineParameters) -> Self {
        Self {
            multiplier: params.multiplier.get(),
            scale_factor: params.scale_factor,
            use_device: params.use_device,
        }
    }
}
