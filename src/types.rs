use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

/// One daily closing price.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Ordered daily closes for a single instrument. Dates strictly increase.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
    ticker: String,
    points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn new(ticker: impl Into<String>, points: Vec<PricePoint>) -> Result<Self> {
        for pair in points.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(DetectorError::InvalidSeries(format!(
                    "dates must strictly increase ({} followed by {})",
                    pair[0].date, pair[1].date
                )));
            }
        }
        if let Some(bad) = points.iter().find(|p| !p.close.is_finite()) {
            return Err(DetectorError::InvalidSeries(format!(
                "non-finite close on {}",
                bad.date
            )));
        }
        Ok(PriceSeries {
            ticker: ticker.into(),
            points,
        })
    }

    /// Sorts by date and keeps the last observation for a repeated date.
    pub fn from_unordered(ticker: impl Into<String>, mut points: Vec<PricePoint>) -> Result<Self> {
        points.sort_by_key(|p| p.date);
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(points.len());
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        Self::new(ticker, deduped)
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }
}

/// One detection case: an instrument and the event date to search around.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub ticker: String,
    pub reference_date: NaiveDate,
    pub lookback_offset_days: u64,
}

impl Case {
    pub fn new(ticker: impl Into<String>, reference_date: NaiveDate, lookback_offset_days: u64) -> Self {
        Case {
            ticker: ticker.into(),
            reference_date,
            lookback_offset_days,
        }
    }

    /// First calendar date of price history to request.
    pub fn history_start(&self) -> NaiveDate {
        self.reference_date
            .checked_sub_days(Days::new(self.lookback_offset_days))
            .unwrap_or(NaiveDate::MIN)
    }

    /// Dates strictly before this belong to the training split.
    pub fn cutoff(&self, gap_days: u64) -> NaiveDate {
        self.reference_date
            .checked_sub_days(Days::new(gap_days))
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Contiguous, non-overlapping train/test partition of a series.
#[derive(Clone, Debug)]
pub struct Split {
    pub train: PriceSeries,
    pub test: PriceSeries,
}

impl Split {
    /// Train takes every date strictly before `cutoff`, test the rest.
    pub fn at_cutoff(series: &PriceSeries, cutoff: NaiveDate) -> Self {
        let index = series.points().partition_point(|p| p.date < cutoff);
        Self::at_index(series, index)
    }

    pub fn at_index(series: &PriceSeries, index: usize) -> Self {
        let index = index.min(series.len());
        let (train, test) = series.points().split_at(index);
        Split {
            train: PriceSeries {
                ticker: series.ticker.clone(),
                points: train.to_vec(),
            },
            test: PriceSeries {
                ticker: series.ticker.clone(),
                points: test.to_vec(),
            },
        }
    }
}
