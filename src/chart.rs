//! Plot-ready export of the scored test period.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use crate::pipeline::RunOutcome;

#[derive(Debug, Serialize)]
struct ChartRow {
    date: NaiveDate,
    close: f64,
    loss: f64,
    threshold: f64,
    is_anomaly: bool,
    most_unusual: bool,
}

/// One row per scored test window, in date order.
pub fn write_chart_csv<W: Write>(writer: W, outcome: &RunOutcome) -> anyhow::Result<()> {
    let closes: HashMap<NaiveDate, f64> = outcome
        .split
        .test
        .points()
        .iter()
        .map(|p| (p.date, p.close))
        .collect();
    let extreme = outcome.board.most_unusual().map(|r| r.date);

    let mut rows: Vec<ChartRow> = outcome
        .board
        .ranked()
        .iter()
        .map(|r| ChartRow {
            date: r.date,
            close: closes.get(&r.date).copied().unwrap_or(f64::NAN),
            loss: r.loss,
            threshold: r.threshold,
            is_anomaly: r.is_anomaly,
            most_unusual: Some(r.date) == extreme,
        })
        .collect();
    rows.sort_by_key(|r| r.date);

    let mut csv_writer = csv::Writer::from_writer(writer);
    for row in &rows {
        csv_writer.serialize(row)?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Writes the chart CSV to `path`.
pub async fn export(path: &Path, outcome: &RunOutcome) -> anyhow::Result<()> {
    let mut buffer = Vec::new();
    write_chart_csv(&mut buffer, outcome)?;
    tokio::fs::write(path, buffer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectorConfig, ModelConfig};
    use crate::pipeline::Detector;
    use crate::types::{Case, PricePoint, PriceSeries, Split};
    use chrono::Days;

    fn outcome() -> RunOutcome {
        let start = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
        let points = (0..40)
            .map(|i| PricePoint {
                date: start + Days::new(i),
                close: 50.0 + (i as f64 * 0.4).sin(),
            })
            .collect();
        let series = PriceSeries::new("CH", points).unwrap();
        let config = DetectorConfig {
            window_len: 4,
            model: ModelConfig {
                hidden_size: 3,
                max_epochs: 2,
                ..ModelConfig::default()
            },
            ..DetectorConfig::default()
        };
        let case = Case::new("CH", start, 10);
        Detector::new(config)
            .unwrap()
            .run_split(&case, Split::at_index(&series, 30))
            .unwrap()
    }

    #[test]
    fn exports_one_row_per_window_with_single_extreme() {
        let outcome = outcome();
        let mut buffer = Vec::new();
        write_chart_csv(&mut buffer, &outcome).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "date,close,loss,threshold,is_anomaly,most_unusual");
        assert_eq!(lines.len(), 1 + 6);
        assert_eq!(lines.iter().filter(|l| l.ends_with(",true")).count(), 1);
    }

    #[tokio::test]
    async fn export_writes_the_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chart.csv");
        export(&path, &outcome()).await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1 + 6);
    }

    #[tokio::test]
    async fn export_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("chart.csv");
        assert!(export(&path, &outcome()).await.is_err());
    }
}
