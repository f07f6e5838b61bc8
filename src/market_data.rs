use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use std::future::Future;
use std::path::PathBuf;
use tracing::info;

use crate::error::{DetectorError, Result};
use crate::lookup::parse_date;
use crate::types::{PricePoint, PriceSeries};

/// Daily closing prices from `start` to the present.
pub trait PriceSource {
    fn daily_closes(
        &self,
        ticker: &str,
        start: NaiveDate,
    ) -> impl Future<Output = Result<PriceSeries>> + Send;
}

/// Yahoo Finance chart API client.
#[derive(Clone)]
pub struct YahooClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<Quote>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    close: Vec<Option<f64>>,
}

impl YahooClient {
    pub fn new() -> Self {
        Self::with_base_url("https://query1.finance.yahoo.com/v8/finance/chart")
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn fetch(&self, ticker: &str, start: NaiveDate) -> anyhow::Result<PriceSeries> {
        let period1 = start
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let period2 = Utc::now().timestamp();
        let url = format!(
            "{}/{}?period1={}&period2={}&interval=1d",
            self.base_url, ticker, period1, period2
        );

        let response: ChartResponse = self
            .client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        parse_chart(ticker, response)
    }
}

impl Default for YahooClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceSource for YahooClient {
    #[tracing::instrument(name = "yahoo_daily_closes", skip(self))]
    async fn daily_closes(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries> {
        let series = self
            .fetch(ticker, start)
            .await
            .map_err(|e| DetectorError::input_unavailable(format!("price history for {}", ticker), e))?;
        info!(points = series.len(), "downloaded daily closes");
        Ok(series)
    }
}

fn parse_chart(ticker: &str, response: ChartResponse) -> anyhow::Result<PriceSeries> {
    if let Some(error) = response.chart.error {
        anyhow::bail!("Yahoo Finance error: {} - {}", error.code, error.description);
    }
    let result = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| anyhow::anyhow!("no chart data returned"))?;
    let timestamps = result.timestamp.unwrap_or_default();
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("no quote data"))?;

    let points = timestamps
        .iter()
        .zip(quote.close)
        .filter_map(|(&ts, close)| {
            let date = DateTime::<Utc>::from_timestamp(ts, 0)?.date_naive();
            close.filter(|c| c.is_finite()).map(|close| PricePoint { date, close })
        })
        .collect();
    Ok(PriceSeries::from_unordered(ticker, points)?)
}

/// Reads `date,close` rows from a local CSV file.
#[derive(Clone, Debug)]
pub struct CsvPriceSource {
    path: PathBuf,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "Date", alias = "timestamp")]
    date: String,
    #[serde(alias = "Close", alias = "price")]
    close: f64,
}

impl CsvPriceSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self, ticker: &str, start: NaiveDate) -> anyhow::Result<PriceSeries> {
        let bytes = tokio::fs::read(&self.path).await?;
        parse_price_csv(ticker, start, &bytes)
    }
}

fn parse_price_csv(ticker: &str, start: NaiveDate, bytes: &[u8]) -> anyhow::Result<PriceSeries> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let mut points = Vec::new();
    for row in reader.deserialize::<CsvRow>() {
        let row = row?;
        let date = parse_date(&row.date)
            .ok_or_else(|| anyhow::anyhow!("unrecognized date {:?}", row.date))?;
        if date >= start {
            points.push(PricePoint {
                date,
                close: row.close,
            });
        }
    }
    Ok(PriceSeries::from_unordered(ticker, points)?)
}

impl PriceSource for CsvPriceSource {
    async fn daily_closes(&self, ticker: &str, start: NaiveDate) -> Result<PriceSeries> {
        let series = self.load(ticker, start).await.map_err(|e| {
            DetectorError::input_unavailable(format!("price file {}", self.path.display()), e)
        })?;
        info!(points = series.len(), path = %self.path.display(), "loaded daily closes");
        Ok(series)
    }
}
