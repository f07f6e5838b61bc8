//! Reconstruction-error anomaly detection around a known event date.
//!
//! A sequence autoencoder learns what "normal" price windows look like
//! from the history before the event, then flags later windows it cannot
//! reproduce well.

pub mod chart;
pub mod config;
pub mod error;
pub mod lookup;
pub mod market_data;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scaler;
pub mod scoring;
pub mod storage;
pub mod types;
pub mod windowing;

pub use config::{DetectorConfig, ModelConfig};
pub use error::{DetectorError, Result};
pub use pipeline::{Detector, RunOutcome};
pub use report::{Report, ScoreBoard};
pub use types::{Case, PricePoint, PriceSeries, Split};
