use chrono::NaiveDate;
use serde::Deserialize;
use std::io::Read;

use crate::error::{DetectorError, Result};
use crate::types::Case;

#[derive(Debug, Deserialize)]
struct LookupRow {
    #[serde(alias = "Ticker", alias = "symbol")]
    ticker: String,
    #[serde(alias = "date", alias = "transaction date", alias = "Date")]
    transaction_date: String,
}

/// Instrument → reference date table.
#[derive(Clone, Debug)]
pub struct CaseLookup {
    entries: Vec<(String, NaiveDate)>,
}

impl CaseLookup {
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut entries = Vec::new();
        for row in csv_reader.deserialize::<LookupRow>() {
            let row = row.map_err(|e| DetectorError::input_unavailable("case lookup", e))?;
            let date = parse_date(&row.transaction_date).ok_or_else(|| {
                DetectorError::input_unavailable(
                    "case lookup",
                    anyhow::anyhow!("unrecognized date {:?} for {}", row.transaction_date, row.ticker),
                )
            })?;
            entries.push((row.ticker, date));
        }
        if entries.is_empty() {
            return Err(DetectorError::input_unavailable(
                "case lookup",
                anyhow::anyhow!("lookup table has no rows"),
            ));
        }
        Ok(Self { entries })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_reader(bytes)
    }

    /// The row for `ticker`, or the first row when no ticker is requested.
    pub fn resolve(&self, ticker: Option<&str>, lookback_offset_days: u64) -> Result<Case> {
        let found = match ticker {
            Some(wanted) => self
                .entries
                .iter()
                .find(|(t, _)| t.eq_ignore_ascii_case(wanted)),
            None => self.entries.first(),
        };
        let (ticker, date) = found.ok_or_else(|| {
            DetectorError::input_unavailable(
                "case lookup",
                anyhow::anyhow!("no entry for ticker {}", ticker.unwrap_or_default()),
            )
        })?;
        Ok(Case::new(ticker.clone(), *date, lookback_offset_days))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    let date_part = raw
        .split(|c: char| c == 'T' || c == ' ')
        .next()
        .unwrap_or(raw);
    ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_requested_ticker() {
        let csv = "ticker,transaction_date\nAAPL,2021-03-01\nMSFT,2020-11-15\n";
        let lookup = CaseLookup::from_bytes(csv.as_bytes()).unwrap();
        let case = lookup.resolve(Some("msft"), 1500).unwrap();
        assert_eq!(case.ticker, "MSFT");
        assert_eq!(case.reference_date, NaiveDate::from_ymd_opt(2020, 11, 15).unwrap());
        assert_eq!(case.lookback_offset_days, 1500);
    }

    #[test]
    fn defaults_to_first_row() {
        let csv = "ticker,date\nTSLA,03/04/2022\n";
        let lookup = CaseLookup::from_bytes(csv.as_bytes()).unwrap();
        let case = lookup.resolve(None, 10).unwrap();
        assert_eq!(case.ticker, "TSLA");
        assert_eq!(case.reference_date, NaiveDate::from_ymd_opt(2022, 3, 4).unwrap());
    }

    #[test]
    fn accepts_spaced_header_and_timestamps() {
        let csv = "ticker, transaction date\nNVDA, 2023-06-01 00:00:00\n";
        let lookup = CaseLookup::from_bytes(csv.as_bytes()).unwrap();
        assert_eq!(lookup.len(), 1);
        let case = lookup.resolve(Some("NVDA"), 1).unwrap();
        assert_eq!(case.reference_date.to_string(), "2023-06-01");
    }

    #[test]
    fn unknown_ticker_is_unavailable() {
        let csv = "ticker,transaction_date\nAAPL,2021-03-01\n";
        let lookup = CaseLookup::from_bytes(csv.as_bytes()).unwrap();
        assert!(matches!(
            lookup.resolve(Some("GOOG"), 1),
            Err(DetectorError::InputUnavailable { .. })
        ));
    }

    #[test]
    fn empty_or_malformed_tables_fail() {
        assert!(CaseLookup::from_bytes(b"ticker,transaction_date\n").is_err());
        assert!(CaseLookup::from_bytes(b"ticker,transaction_date\nAAPL,yesterday\n").is_err());
    }
}
