use tracing::{info, warn};

use crate::config::DetectorConfig;
use crate::error::{DetectorError, Result};
use crate::model::{LstmAutoencoder, Trainer, TrainingReport};
use crate::report::{Report, ScoreBoard};
use crate::scaler::{FeatureScaler, ScalerState};
use crate::scoring::{reconstruction_losses, score_windows, Threshold};
use crate::storage::ObjectStore;
use crate::types::{Case, PriceSeries, Split};
use crate::windowing::{column, windows};

/// Everything one run produced, kept together for reporting and charts.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub report: Report,
    pub board: ScoreBoard,
    pub threshold: Threshold,
    pub scaler: ScalerState,
    pub training: TrainingReport,
    pub train_losses: Vec<f64>,
    pub split: Split,
}

/// Runs the split → scale → window → train → score → rank pipeline.
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    pub fn new(config: DetectorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Splits `series` at `reference_date - gap_days` and runs the pipeline.
    pub fn run(&self, case: &Case, series: &PriceSeries) -> Result<RunOutcome> {
        let split = Split::at_cutoff(series, case.cutoff(self.config.gap_days));
        self.run_split(case, split)
    }

    /// Runs the pipeline on a prepared split. Model and scaler live only
    /// for the duration of this call.
    #[tracing::instrument(name = "detect", skip_all, fields(ticker = %case.ticker))]
    pub fn run_split(&self, case: &Case, split: Split) -> Result<RunOutcome> {
        let len = self.config.window_len;
        info!(
            train = split.train.len(),
            test = split.test.len(),
            window = len,
            "split history"
        );
        if split.train.len() <= len {
            return Err(DetectorError::InsufficientData(format!(
                "training split has {} points, need at least {}",
                split.train.len(),
                len + 1
            )));
        }

        let scaler = FeatureScaler::fit(&split.train.closes())?;
        let train_scaled = column(&scaler.apply(&split.train.closes()));
        let test_scaled = column(&scaler.apply(&split.test.closes()));

        let train_windows = windows(&train_scaled, len, self.config.target_mode)?;
        let test_windows = windows(&test_scaled, len, self.config.target_mode)?;
        if test_windows.is_empty() {
            warn!(
                test = split.test.len(),
                window = len,
                "test split too short to form a window"
            );
        }

        let model_config = &self.config.model;
        let mut model = LstmAutoencoder::new(
            1,
            len,
            model_config.hidden_size,
            model_config.dropout,
            model_config.seed,
        );
        let training = Trainer::new(model_config.clone()).fit(
            &mut model,
            &train_windows.inputs,
            &train_windows.targets,
        )?;

        let train_losses = reconstruction_losses(&model, &train_windows.inputs);
        let threshold = Threshold::from_train_losses(&train_losses, self.config.threshold_sigmas)?;
        info!(
            threshold = threshold.value(),
            mean = threshold.mean(),
            std = threshold.std(),
            "threshold from training windows"
        );

        let test_losses = reconstruction_losses(&model, &test_windows.inputs);
        let test_dates = split.test.dates();
        let window_dates: Vec<_> = (0..test_windows.count())
            .map(|i| test_dates[test_windows.end_index(i)])
            .collect();
        let records = score_windows(&window_dates, &test_losses, &threshold);

        let board = ScoreBoard::new(records);
        let report = Report::build(&board, case, threshold.value(), self.config.top_k);
        match board.most_unusual() {
            Some(extreme) => info!(
                date = %extreme.date,
                loss = extreme.loss,
                anomalies = board.anomalies().count(),
                scored = board.len(),
                "scored test windows"
            ),
            None => info!("no test windows scored"),
        }

        Ok(RunOutcome {
            report,
            board,
            threshold,
            scaler,
            training,
            train_losses,
            split,
        })
    }
}

/// Encodes `report` as YAML and stores it under `key`.
///
/// Any failure past this point comes back as [`DetectorError::OutputDelivery`]
/// carrying the report, so the caller can still emit or retry it.
pub async fn deliver<S: ObjectStore>(store: &S, key: &str, report: Report) -> Result<()> {
    let stored = match report.to_yaml() {
        Ok(yaml) => store.put(key, yaml.into_bytes()).await,
        Err(e) => Err(e.into()),
    };
    if let Err(source) = stored {
        return Err(DetectorError::OutputDelivery {
            key: key.to_string(),
            report: Box::new(report),
            source,
        });
    }
    info!(key, "report delivered");
    Ok(())
}
