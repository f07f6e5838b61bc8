//! Minibatch training loop with explicit early-stopping state.

use ndarray::{s, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::optimizer::Adam;
use super::LstmAutoencoder;
use crate::config::ModelConfig;
use crate::error::{DetectorError, Result};
use crate::metrics::{TRAINING_DURATION, TRAINING_EPOCHS};

/// Tracks the best monitored loss and how long it has gone unimproved.
#[derive(Clone, Debug)]
pub struct EarlyStopping {
    patience: usize,
    best_loss: f64,
    best_epoch: Option<usize>,
    epochs_without_improvement: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best_loss: f64::INFINITY,
            best_epoch: None,
            epochs_without_improvement: 0,
        }
    }

    /// Records one epoch. Returns true if `loss` is a new best.
    pub fn observe(&mut self, epoch: usize, loss: f64) -> bool {
        if loss < self.best_loss {
            self.best_loss = loss;
            self.best_epoch = Some(epoch);
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }

    pub fn should_stop(&self) -> bool {
        self.epochs_without_improvement >= self.patience
    }

    pub fn best_loss(&self) -> f64 {
        self.best_loss
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn epochs_without_improvement(&self) -> usize {
        self.epochs_without_improvement
    }
}

/// Loss never improved after the first epoch. Logged, never fatal.
#[derive(Clone, Debug, PartialEq)]
pub struct ConvergenceWarning {
    pub epochs_run: usize,
    pub best_loss: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "monitored loss did not improve after the first epoch ({} epochs, best {:.6})",
            self.epochs_run, self.best_loss
        )
    }
}

/// Which loss drove early stopping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Monitor {
    Validation,
    Training,
}

#[derive(Clone, Debug)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub train_losses: Vec<f64>,
    pub val_losses: Vec<f64>,
    pub monitor: Monitor,
    pub best_epoch: Option<usize>,
    pub best_loss: f64,
    pub stopped_early: bool,
    pub restored_best: bool,
    pub warning: Option<ConvergenceWarning>,
}

pub struct Trainer {
    config: ModelConfig,
}

impl Trainer {
    pub fn new(config: ModelConfig) -> Self {
        Self { config }
    }

    /// Trains `model` in place. Windows are consumed in time order; the
    /// trailing `validation_fraction` of them is held out for early stopping.
    #[tracing::instrument(name = "train", skip_all, fields(windows = inputs.len_of(Axis(0))))]
    pub fn fit(
        &self,
        model: &mut LstmAutoencoder,
        inputs: &Array3<f64>,
        targets: &Array3<f64>,
    ) -> Result<TrainingReport> {
        let n = inputs.len_of(Axis(0));
        if n == 0 {
            return Err(DetectorError::InsufficientData(
                "no training windows to fit the model on".into(),
            ));
        }
        if targets.dim() != inputs.dim() {
            return Err(DetectorError::InvalidConfig(format!(
                "target shape {:?} does not match input shape {:?}",
                targets.dim(),
                inputs.dim()
            )));
        }

        let (n_train, monitor) = split_point(n, self.config.validation_fraction);
        let x_train = inputs.slice(s![..n_train, .., ..]);
        let y_train = targets.slice(s![..n_train, .., ..]);
        let x_val = inputs.slice(s![n_train.., .., ..]).to_owned();
        let y_val = targets.slice(s![n_train.., .., ..]).to_owned();
        info!(
            train = n_train,
            validation = n - n_train,
            ?monitor,
            "starting training"
        );

        let started = Instant::now();
        let mut adam = Adam::new(self.config.learning_rate);
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(1));
        let mut stopping = EarlyStopping::new(self.config.patience);
        let mut best_model: Option<LstmAutoencoder> = None;
        let mut train_losses = Vec::new();
        let mut val_losses = Vec::new();
        let mut stopped_early = false;

        for epoch in 0..self.config.max_epochs {
            let mut weighted = 0.0;
            for start in (0..n_train).step_by(self.config.batch_size) {
                let end = (start + self.config.batch_size).min(n_train);
                let x = x_train.slice(s![start..end, .., ..]).to_owned();
                let y = y_train.slice(s![start..end, .., ..]).to_owned();
                weighted += model.train_step(&x, &y, &mut adam, &mut rng) * (end - start) as f64;
            }
            let train_loss = weighted / n_train as f64;
            train_losses.push(train_loss);

            let monitored = match monitor {
                Monitor::Validation => {
                    let val_loss = model.evaluate(&x_val, &y_val);
                    val_losses.push(val_loss);
                    val_loss
                }
                Monitor::Training => train_loss,
            };
            TRAINING_EPOCHS.inc();

            let improved = stopping.observe(epoch, monitored);
            if improved && self.config.restore_best {
                best_model = Some(model.clone());
            }
            debug!(
                epoch = epoch + 1,
                train_loss,
                monitored,
                improved,
                "epoch finished"
            );

            if stopping.should_stop() {
                stopped_early = epoch + 1 < self.config.max_epochs;
                info!(
                    epoch = epoch + 1,
                    patience = self.config.patience,
                    "early stopping"
                );
                break;
            }
        }

        let epochs_run = train_losses.len();
        let restored_best = match best_model {
            Some(best) if self.config.restore_best => {
                *model = best;
                true
            }
            _ => false,
        };

        let warning = match stopping.best_epoch() {
            Some(0) if epochs_run > 1 => Some(ConvergenceWarning {
                epochs_run,
                best_loss: stopping.best_loss(),
            }),
            _ => None,
        };
        if let Some(w) = &warning {
            warn!(epochs = w.epochs_run, best_loss = w.best_loss, "{}", w);
        }

        TRAINING_DURATION.observe(started.elapsed().as_secs_f64());
        info!(
            epochs = epochs_run,
            best_epoch = stopping.best_epoch().map(|e| e + 1),
            best_loss = stopping.best_loss(),
            "training finished"
        );

        Ok(TrainingReport {
            epochs_run,
            train_losses,
            val_losses,
            monitor,
            best_epoch: stopping.best_epoch(),
            best_loss: stopping.best_loss(),
            stopped_early,
            restored_best,
            warning,
        })
    }
}

/// Number of leading windows used for training, and what gets monitored.
fn split_point(n: usize, validation_fraction: f64) -> (usize, Monitor) {
    let n_train = ((n as f64) * (1.0 - validation_fraction)) as usize;
    if n_train == 0 || n_train >= n {
        (n, Monitor::Training)
    } else {
        (n_train, Monitor::Validation)
    }
}
