use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};
use std::path::Path;

/// Training epochs completed across all runs in this process.
pub static TRAINING_EPOCHS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("training_epochs_total", "Training epochs completed").unwrap()
});

/// Test windows scored against the threshold.
pub static WINDOWS_SCORED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("windows_scored_total", "Test windows scored").unwrap()
});

/// Test windows whose loss exceeded the threshold.
pub static ANOMALIES_FLAGGED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("anomalies_flagged_total", "Test windows flagged as anomalous").unwrap()
});

pub static TRAINING_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "training_duration_seconds",
        "Wall time spent fitting the reconstruction model",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]
    )
    .expect("failed to create histogram")
});

pub static SCORING_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "scoring_duration_seconds",
        "Wall time spent reconstructing and scoring windows"
    )
    .expect("failed to create histogram")
});

/// Current registry contents in the text exposition format.
pub fn render() -> anyhow::Result<String> {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder.encode(&prometheus::gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

/// Writes [`render`] output to `path`, e.g. for a textfile collector.
pub async fn export(path: &Path) -> anyhow::Result<()> {
    tokio::fs::write(path, render()?).await?;
    Ok(())
}
