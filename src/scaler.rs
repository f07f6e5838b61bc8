//! Z-score scaling fitted on the training split only.

use tracing::warn;

use crate::error::{DetectorError, Result};

const MIN_SCALE: f64 = 1e-12;

/// Frozen location/scale statistics. Only [`FeatureScaler::fit`] builds one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScalerState {
    mean: f64,
    scale: f64,
    degenerate: bool,
}

pub struct FeatureScaler;

impl FeatureScaler {
    /// Population mean and standard deviation of `reference`.
    ///
    /// A flat reference has no usable spread; the scale falls back to 1.0 so
    /// the transform degrades to mean-centering.
    pub fn fit(reference: &[f64]) -> Result<ScalerState> {
        if reference.is_empty() {
            return Err(DetectorError::InsufficientData(
                "cannot fit scaler on an empty series".into(),
            ));
        }
        let n = reference.len() as f64;
        let mean = reference.iter().sum::<f64>() / n;
        let variance = reference.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        if !(std.is_finite() && std > MIN_SCALE) {
            warn!(
                mean,
                points = reference.len(),
                "reference series has zero variance, using unit scale"
            );
            return Ok(ScalerState {
                mean,
                scale: 1.0,
                degenerate: true,
            });
        }

        Ok(ScalerState {
            mean,
            scale: std,
            degenerate: false,
        })
    }
}

impl ScalerState {
    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// True when the fallback unit scale is in use.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    pub fn apply(&self, values: &[f64]) -> Vec<f64> {
        values.iter().map(|x| (x - self.mean) / self.scale).collect()
    }
}
