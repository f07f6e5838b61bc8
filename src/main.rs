use clap::Parser;
use event_anomaly::config::DetectorConfig;
use event_anomaly::error::DetectorError;
use event_anomaly::lookup::CaseLookup;
use event_anomaly::market_data::{CsvPriceSource, PriceSource, YahooClient};
use event_anomaly::pipeline::deliver;
use event_anomaly::storage::{object_key, HttpStore, LocalStore, ObjectStore};
use event_anomaly::{chart, metrics, Case, Detector, PriceSeries};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "event_anomaly",
    about = "Flag anomalous trading days around a known transaction date"
)]
struct Opt {
    /// Bucket holding the case files (a directory unless --store-endpoint is set)
    #[arg(long, env = "EVENT_ANOMALY_BUCKET")]
    bucket: String,
    /// Path of the case inside the bucket
    #[arg(long, env = "EVENT_ANOMALY_CASE_PATH")]
    case_path: String,
    /// Lookup table mapping tickers to transaction dates
    #[arg(long, env = "EVENT_ANOMALY_LOOKUP_FILE", default_value = "cases.csv")]
    lookup_file: String,
    /// Ticker to analyse; defaults to the first row of the lookup table
    #[arg(long, env = "EVENT_ANOMALY_TICKER")]
    ticker: Option<String>,
    /// Name of the report object written next to the input
    #[arg(long, env = "EVENT_ANOMALY_REPORT_FILE", default_value = "report.yaml")]
    report_file: String,
    /// HTTP object storage endpoint
    #[arg(long, env = "EVENT_ANOMALY_STORE_ENDPOINT")]
    store_endpoint: Option<String>,
    /// Bearer token for the storage endpoint
    #[arg(long, env = "EVENT_ANOMALY_STORE_TOKEN", hide_env_values = true)]
    store_token: Option<String>,
    /// Read prices from a local `date,close` CSV instead of downloading them
    #[arg(long)]
    prices_csv: Option<PathBuf>,
    /// JSON file overriding detector settings
    #[arg(long, env = "EVENT_ANOMALY_CONFIG")]
    config: Option<PathBuf>,
    /// Write plot-ready scores of the test period to this CSV file
    #[arg(long)]
    chart_out: Option<PathBuf>,
    /// Write Prometheus metrics in text format to this file at exit
    #[arg(long)]
    metrics_out: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let opt = Opt::parse();
    let config = match &opt.config {
        Some(path) => DetectorConfig::from_file(path)?,
        None => DetectorConfig::default(),
    };

    let result = match &opt.store_endpoint {
        Some(endpoint) => {
            let store = HttpStore::new(endpoint.clone(), opt.bucket.clone(), opt.store_token.clone());
            run(&opt, config, &store).await
        }
        None => run(&opt, config, &LocalStore::new(&opt.bucket)).await,
    };

    if let Some(path) = &opt.metrics_out {
        if let Err(e) = metrics::export(path).await {
            warn!(path = %path.display(), "metrics export failed: {:#}", e);
        }
    }

    match result {
        Ok(()) => Ok(()),
        Err(err) if err.is_delivery() => {
            error!("{}", err);
            if let Some(report) = err.into_report() {
                // keep the computed work visible so delivery alone can be retried
                println!("{}", report.to_yaml()?);
            }
            std::process::exit(2);
        }
        Err(err) => Err(err.into()),
    }
}

async fn run<S: ObjectStore>(opt: &Opt, config: DetectorConfig, store: &S) -> Result<(), DetectorError> {
    let lookup_bytes = store.get(&object_key(&opt.case_path, &opt.lookup_file)).await?;
    let case = CaseLookup::from_bytes(&lookup_bytes)?
        .resolve(opt.ticker.as_deref(), config.lookback_offset_days)?;
    info!(
        ticker = %case.ticker,
        transaction_date = %case.reference_date,
        history_start = %case.history_start(),
        "resolved case"
    );

    let series = fetch_prices(opt, &case).await?;
    let outcome = Detector::new(config)?.run(&case, &series)?;

    if let Some(path) = &opt.chart_out {
        if let Err(e) = chart::export(path, &outcome).await {
            warn!(path = %path.display(), "chart export failed: {:#}", e);
        }
    }

    let key = object_key(&opt.case_path, &opt.report_file);
    deliver(store, &key, outcome.report).await
}

async fn fetch_prices(opt: &Opt, case: &Case) -> Result<PriceSeries, DetectorError> {
    match &opt.prices_csv {
        Some(path) => {
            CsvPriceSource::new(path)
                .daily_closes(&case.ticker, case.history_start())
                .await
        }
        None => {
            YahooClient::new()
                .daily_closes(&case.ticker, case.history_start())
                .await
        }
    }
}
