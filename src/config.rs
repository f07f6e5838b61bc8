use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DetectorError, Result};
use crate::windowing::TargetMode;

/// Run-level settings for one detection case.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Timesteps per window
    pub window_len: usize,
    /// Days between the end of the training split and the reference date
    pub gap_days: u64,
    /// Days of history requested before the reference date
    pub lookback_offset_days: u64,
    /// Records kept in the report
    pub top_k: usize,
    /// Standard deviations above the mean training loss
    pub threshold_sigmas: f64,
    pub target_mode: TargetMode,
    pub model: ModelConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            window_len: 30,
            gap_days: 50,
            lookback_offset_days: 1500,
            top_k: 5,
            threshold_sigmas: 2.0,
            target_mode: TargetMode::Reconstruct,
            model: ModelConfig::default(),
        }
    }
}

/// Encoder-decoder shape and training protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_size: usize,
    pub dropout: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    pub validation_fraction: f64,
    pub patience: usize,
    pub learning_rate: f64,
    /// Reload the parameters of the best validation epoch after stopping
    pub restore_best: bool,
    pub seed: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_size: 128,
            dropout: 0.2,
            batch_size: 32,
            max_epochs: 100,
            validation_fraction: 0.1,
            patience: 3,
            learning_rate: 0.001,
            restore_best: true,
            seed: 42,
        }
    }
}

impl DetectorConfig {
    /// Load overrides from a JSON file; missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            DetectorError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| DetectorError::InvalidConfig(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(DetectorError::InvalidConfig(msg.to_string()));
        if self.window_len == 0 {
            return invalid("window_len must be at least 1");
        }
        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        if !(self.threshold_sigmas.is_finite() && self.threshold_sigmas >= 0.0) {
            return invalid("threshold_sigmas must be a non-negative number");
        }
        self.model.validate()
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(DetectorError::InvalidConfig(msg.to_string()));
        if self.hidden_size == 0 {
            return invalid("hidden_size must be at least 1");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return invalid("dropout must be in [0, 1)");
        }
        if self.batch_size == 0 {
            return invalid("batch_size must be at least 1");
        }
        if self.max_epochs == 0 {
            return invalid("max_epochs must be at least 1");
        }
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return invalid("validation_fraction must be in [0, 1)");
        }
        if self.patience == 0 {
            return invalid("patience must be at least 1");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return invalid("learning_rate must be positive");
        }
        Ok(())
    }
}
