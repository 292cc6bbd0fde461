use serde::{Deserialize, Serialize};

use crate::analysis::filter::FilterSpec;
use crate::error::SignalError;

/// Read-only settings shared by every recording of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub filter: FilterSpec,
    pub window_size: usize,
    pub overlap_size: usize,
    pub features: FeatureConfig,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            filter: FilterSpec::default(),
            window_size: 1500,
            overlap_size: 750,
            features: FeatureConfig::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn from_json(json: &str) -> Result<Self, SignalError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SignalError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SignalError> {
        if self.window_size == 0 || self.overlap_size >= self.window_size {
            return Err(SignalError::Configuration(format!(
                "overlap {} must be smaller than window {}",
                self.overlap_size, self.window_size
            )));
        }
        self.features.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Low-frequency band in Hz.
    pub lf_band: (f64, f64),
    /// High-frequency band in Hz.
    pub hf_band: (f64, f64),
    /// HF power at or below this leaves `LF_HF_ratio` missing.
    pub hf_floor: f64,
    pub irregularity_threshold_ms: f64,
    pub welch_segment_len: usize,
    /// Columns removed from every table after assembly.
    pub dropped_columns: Vec<String>,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lf_band: (0.04, 0.15),
            hf_band: (0.15, 0.4),
            hf_floor: 1e-10,
            irregularity_threshold_ms: 50.0,
            welch_segment_len: 256,
            dropped_columns: [
                "HRV_SDANN1", "HRV_SDNNI1", "HRV_SDANN2", "HRV_SDNNI2", "HRV_SDANN5", "HRV_SDNNI5",
                "LF", "HF", "LF_HF_ratio",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

impl FeatureConfig {
    pub fn validate(&self) -> Result<(), SignalError> {
        for (name, (lo, hi)) in [("lf_band", self.lf_band), ("hf_band", self.hf_band)] {
            if !(lo >= 0.0 && lo < hi) {
                return Err(SignalError::Configuration(format!(
                    "{name} must satisfy 0 <= low < high"
                )));
            }
        }
        for (name, value) in [
            ("hf_floor", self.hf_floor),
            ("irregularity_threshold_ms", self.irregularity_threshold_ms),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(SignalError::Configuration(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        if self.welch_segment_len == 0 {
            return Err(SignalError::Configuration("welch_segment_len must be positive".into()));
        }
        Ok(())
    }
}
