use chrono::NaiveDate;
use ndarray::{Array3, Axis};
use serde::Serialize;

use crate::error::{DetectorError, Result};
use crate::metrics::{ANOMALIES_FLAGGED, SCORING_DURATION, WINDOWS_SCORED};
use crate::model::Reconstructor;

/// Score of one test window, dated by the window's last element.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScoreRecord {
    pub date: NaiveDate,
    pub loss: f64,
    pub threshold: f64,
    pub is_anomaly: bool,
}

/// Cutoff derived once from the training-window losses.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Threshold {
    value: f64,
    mean: f64,
    std: f64,
}

impl Threshold {
    /// `mean(|l|) + sigmas * std(|l|)` with population standard deviation.
    pub fn from_train_losses(losses: &[f64], sigmas: f64) -> Result<Self> {
        if losses.is_empty() {
            return Err(DetectorError::InsufficientData(
                "no training losses to derive a threshold from".into(),
            ));
        }
        // Welford: exact for a constant series, so identical windows never
        // land a rounding error above the threshold.
        let mut mean = 0.0;
        let mut m2 = 0.0;
        for (k, loss) in losses.iter().map(|l| l.abs()).enumerate() {
            let delta = loss - mean;
            mean += delta / (k + 1) as f64;
            m2 += delta * (loss - mean);
        }
        let std = (m2 / losses.len() as f64).max(0.0).sqrt();
        Ok(Threshold {
            value: mean + sigmas * std,
            mean,
            std,
        })
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    /// Strictly above the threshold; equality is not anomalous.
    pub fn flag(&self, loss: f64) -> bool {
        loss > self.value
    }
}

/// Mean absolute error per window, reduced over timesteps and features.
pub fn window_losses(inputs: &Array3<f64>, reconstructed: &Array3<f64>) -> Vec<f64> {
    (inputs - reconstructed)
        .mapv(f64::abs)
        .outer_iter()
        .map(|w| w.mean().unwrap_or(0.0))
        .collect()
}

/// Reconstructs `inputs` with `model` and returns one loss per window.
pub fn reconstruction_losses<M: Reconstructor>(model: &M, inputs: &Array3<f64>) -> Vec<f64> {
    if inputs.len_of(Axis(0)) == 0 {
        return Vec::new();
    }
    let timer = SCORING_DURATION.start_timer();
    let reconstructed = model.reconstruct(inputs);
    let losses = window_losses(inputs, &reconstructed);
    timer.observe_duration();
    losses
}

/// Pairs every test loss with its date and the run threshold.
pub fn score_windows(dates: &[NaiveDate], losses: &[f64], threshold: &Threshold) -> Vec<ScoreRecord> {
    let records: Vec<ScoreRecord> = dates
        .iter()
        .zip(losses)
        .map(|(&date, &loss)| ScoreRecord {
            date,
            loss,
            threshold: threshold.value(),
            is_anomaly: threshold.flag(loss),
        })
        .collect();
    WINDOWS_SCORED.inc_by(records.len() as u64);
    ANOMALIES_FLAGGED.inc_by(records.iter().filter(|r| r.is_anomaly).count() as u64);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Identity;
    impl Reconstructor for Identity {
        fn reconstruct(&self, inputs: &Array3<f64>) -> Array3<f64> {
            inputs.clone()
        }
    }

    struct Zeros;
    impl Reconstructor for Zeros {
        fn reconstruct(&self, inputs: &Array3<f64>) -> Array3<f64> {
            Array3::zeros(inputs.raw_dim())
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2022, 5, d).unwrap()
    }

    #[test]
    fn threshold_is_mean_plus_two_std() {
        let t = Threshold::from_train_losses(&[1.0, 2.0, 3.0, 4.0], 2.0).unwrap();
        let std = 1.25f64.sqrt();
        assert!((t.mean() - 2.5).abs() < 1e-12);
        assert!((t.std() - std).abs() < 1e-12);
        assert!((t.value() - (2.5 + 2.0 * std)).abs() < 1e-12);
    }

    #[test]
    fn threshold_uses_absolute_losses() {
        let a = Threshold::from_train_losses(&[-1.0, 2.0], 2.0).unwrap();
        let b = Threshold::from_train_losses(&[1.0, 2.0], 2.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn constant_losses_give_exact_threshold() {
        let loss = 0.1 + 0.2;
        let t = Threshold::from_train_losses(&vec![loss; 117], 2.0).unwrap();
        assert_eq!(t.value(), loss);
        assert!(!t.flag(loss));
    }

    #[test]
    fn raising_a_loss_never_lowers_the_threshold() {
        let base = vec![0.2, 0.4, 0.3, 0.9, 0.5];
        let t0 = Threshold::from_train_losses(&base, 2.0).unwrap().value();
        for i in 0..base.len() {
            let mut raised = base.clone();
            raised[i] += 0.5;
            let t1 = Threshold::from_train_losses(&raised, 2.0).unwrap().value();
            if base[i] >= 0.46 {
                assert!(t1 >= t0, "index {}", i);
            }
        }
        let mut max_raised = base.clone();
        max_raised[3] = 5.0;
        assert!(Threshold::from_train_losses(&max_raised, 2.0).unwrap().value() > t0);
    }

    #[test]
    fn flag_is_strict() {
        let t = Threshold::from_train_losses(&[1.0, 3.0], 0.0).unwrap();
        assert_eq!(t.value(), 2.0);
        assert!(!t.flag(2.0));
        assert!(t.flag(2.000001));
        assert!(!t.flag(1.5));
    }

    #[test]
    fn empty_losses_are_insufficient() {
        assert!(Threshold::from_train_losses(&[], 2.0).is_err());
    }

    #[test]
    fn window_loss_reduces_over_time_and_features() {
        let x = Array3::from_shape_vec((2, 2, 1), vec![1.0, -3.0, 0.0, 2.0]).unwrap();
        assert_eq!(reconstruction_losses(&Zeros, &x), vec![2.0, 1.0]);
        assert_eq!(reconstruction_losses(&Identity, &x), vec![0.0, 0.0]);
    }

    #[test]
    fn scoring_is_repeatable() {
        let x = Array3::from_shape_fn((4, 3, 1), |(w, t, _)| (w * t) as f64);
        assert_eq!(reconstruction_losses(&Zeros, &x), reconstruction_losses(&Zeros, &x));
    }

    #[test]
    fn records_carry_the_run_threshold() {
        let t = Threshold::from_train_losses(&[1.0, 1.0], 2.0).unwrap();
        let records = score_windows(&[day(1), day(2), day(3)], &[0.5, 1.0, 1.5], &t);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.threshold == 1.0));
        assert_eq!(
            records.iter().map(|r| r.is_anomaly).collect::<Vec<_>>(),
            vec![false, false, true]
        );
        assert_eq!(records[2].date, day(3));
    }
}
