//! Ranked views over the scored test windows and the serialized summary.

use chrono::NaiveDate;
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::cmp::Ordering;

use crate::scoring::ScoreRecord;
use crate::types::Case;

/// Score records sorted once by loss, highest first. Ties keep the earlier date first.
#[derive(Clone, Debug)]
pub struct ScoreBoard {
    ranked: Vec<ScoreRecord>,
}

impl ScoreBoard {
    pub fn new(mut records: Vec<ScoreRecord>) -> Self {
        records.sort_by(|a, b| {
            b.loss
                .partial_cmp(&a.loss)
                .unwrap_or(Ordering::Equal)
                .then(a.date.cmp(&b.date))
        });
        ScoreBoard { ranked: records }
    }

    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }

    pub fn ranked(&self) -> &[ScoreRecord] {
        &self.ranked
    }

    /// The `k` highest-loss records (fewer when the board is smaller).
    pub fn top(&self, k: usize) -> &[ScoreRecord] {
        &self.ranked[..k.min(self.ranked.len())]
    }

    /// The single most unusual day.
    pub fn most_unusual(&self) -> Option<&ScoreRecord> {
        self.ranked.first()
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.ranked.iter().filter(|r| r.is_anomaly)
    }
}

/// Case summary handed to the delivery collaborator.
#[derive(Clone, Debug, PartialEq)]
pub struct Report {
    pub ticker: String,
    pub transaction_date: NaiveDate,
    pub threshold: f64,
    pub records: Vec<ScoreRecord>,
}

impl Report {
    pub fn build(board: &ScoreBoard, case: &Case, threshold: f64, top_k: usize) -> Self {
        Report {
            ticker: case.ticker.clone(),
            transaction_date: case.reference_date,
            threshold,
            records: board.top(top_k).to_vec(),
        }
    }

    /// YAML document with text-typed values.
    pub fn to_yaml(&self) -> serde_yaml_ng::Result<String> {
        serde_yaml_ng::to_string(self)
    }
}

impl Serialize for Report {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("ticker", &self.ticker)?;
        map.serialize_entry("transaction date", &self.transaction_date.to_string())?;
        map.serialize_entry("threshold", &self.threshold.to_string())?;
        map.serialize_entry("data", &RankedDays(&self.records))?;
        map.end()
    }
}

struct RankedDays<'a>(&'a [ScoreRecord]);

#[derive(Serialize)]
struct DayEntry {
    loss: String,
    is_anomaly: String,
}

impl Serialize for RankedDays<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for record in self.0 {
            let entry = DayEntry {
                loss: record.loss.to_string(),
                is_anomaly: if record.is_anomaly { "True" } else { "False" }.to_string(),
            };
            map.serialize_entry(&record.date.format("%Y-%m-%d").to_string(), &entry)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(day: u32, loss: f64, threshold: f64) -> ScoreRecord {
        ScoreRecord {
            date: NaiveDate::from_ymd_opt(2023, 3, day).unwrap(),
            loss,
            threshold,
            is_anomaly: loss > threshold,
        }
    }

    fn case() -> Case {
        Case::new("ACME", NaiveDate::from_ymd_opt(2023, 4, 15).unwrap(), 1500)
    }

    #[test]
    fn board_is_sorted_descending() {
        let board = ScoreBoard::new(vec![record(1, 0.2, 1.0), record(2, 3.0, 1.0), record(3, 1.5, 1.0)]);
        let losses: Vec<f64> = board.ranked().iter().map(|r| r.loss).collect();
        assert_eq!(losses, vec![3.0, 1.5, 0.2]);
        assert_eq!(board.anomalies().count(), 2);
    }

    #[test]
    fn most_unusual_heads_the_top_list() {
        let records: Vec<_> = (1..=9).map(|d| record(d, (d * 7 % 10) as f64, 4.0)).collect();
        let board = ScoreBoard::new(records);
        let top = board.top(5);
        assert_eq!(board.most_unusual(), top.first());
        assert_eq!(board.most_unusual().unwrap().loss, 9.0);
    }

    #[test]
    fn ties_rank_earlier_dates_first() {
        let board = ScoreBoard::new(vec![record(5, 1.0, 0.0), record(2, 1.0, 0.0)]);
        assert_eq!(board.ranked()[0].date.to_string(), "2023-03-02");
    }

    #[test]
    fn report_holds_at_most_top_k() {
        let records: Vec<_> = (1..=12).map(|d| record(d, d as f64, 0.0)).collect();
        let board = ScoreBoard::new(records);
        assert_eq!(Report::build(&board, &case(), 0.0, 5).records.len(), 5);

        let small = ScoreBoard::new(vec![record(1, 1.0, 0.0), record(2, 2.0, 0.0)]);
        assert_eq!(Report::build(&small, &case(), 0.0, 5).records.len(), 2);

        let empty = ScoreBoard::new(Vec::new());
        assert!(Report::build(&empty, &case(), 0.0, 5).records.is_empty());
        assert!(empty.most_unusual().is_none());
    }

    #[test]
    fn yaml_values_are_text() {
        let board = ScoreBoard::new(vec![record(1, 0.25, 0.5), record(2, 0.75, 0.5)]);
        let report = Report::build(&board, &case(), 0.5, 5);
        let yaml = report.to_yaml().unwrap();

        let doc: serde_yaml_ng::Value = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(doc["ticker"].as_str(), Some("ACME"));
        assert_eq!(doc["transaction date"].as_str(), Some("2023-04-15"));
        assert_eq!(doc["threshold"].as_str(), Some("0.5"));
        assert_eq!(doc["data"]["2023-03-02"]["loss"].as_str(), Some("0.75"));
        assert_eq!(doc["data"]["2023-03-02"]["is_anomaly"].as_str(), Some("True"));
        assert_eq!(doc["data"]["2023-03-01"]["is_anomaly"].as_str(), Some("False"));

        // rank order is preserved in the document
        let first = yaml.find("2023-03-02").unwrap();
        let second = yaml.find("2023-03-01").unwrap();
        assert!(first < second);
    }
}
