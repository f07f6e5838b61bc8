use thiserror::Error;

use crate::report::Report;

/// Result type for detector operations
pub type Result<T> = std::result::Result<T, DetectorError>;

/// Errors that can abort a detection run
#[derive(Error, Debug)]
pub enum DetectorError {
    /// Lookup table, market data or storage input could not be retrieved
    #[error("input unavailable ({what}): {source}")]
    InputUnavailable {
        what: String,
        #[source]
        source: anyhow::Error,
    },

    /// Not enough (or degenerate) data to window or train on
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    /// Price series violates the ordering or finiteness invariant
    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    /// Run parameters out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The report was computed but could not be delivered
    #[error("report delivery failed for {key}: {source}")]
    OutputDelivery {
        key: String,
        report: Box<Report>,
        #[source]
        source: anyhow::Error,
    },
}

impl DetectorError {
    pub fn input_unavailable(what: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        DetectorError::InputUnavailable {
            what: what.into(),
            source: source.into(),
        }
    }

    /// Recover the computed report from a delivery failure.
    pub fn into_report(self) -> Option<Report> {
        match self {
            DetectorError::OutputDelivery { report, .. } => Some(*report),
            _ => None,
        }
    }

    /// True for failures that happened after all computation finished.
    pub fn is_delivery(&self) -> bool {
        matches!(self, DetectorError::OutputDelivery { .. })
    }
}
