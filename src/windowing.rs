use ndarray::{s, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{DetectorError, Result};

/// What each window is trained to reproduce.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetMode {
    /// The window itself
    #[default]
    Reconstruct,
    /// The value following the window, repeated across every timestep
    NextValue,
}

/// Overlapping fixed-length windows of shape (windows, len, features).
#[derive(Clone, Debug)]
pub struct Windows {
    pub inputs: Array3<f64>,
    pub targets: Array3<f64>,
    len: usize,
}

impl Windows {
    pub fn count(&self) -> usize {
        self.inputs.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn window_len(&self) -> usize {
        self.len
    }

    /// Series index of the last element of window `i`.
    pub fn end_index(&self, i: usize) -> usize {
        i + self.len - 1
    }
}

/// Slides a window of `len` rows over `series` (rows are timesteps,
/// columns are features), one step at a time, without padding.
pub fn windows(series: &Array2<f64>, len: usize, mode: TargetMode) -> Result<Windows> {
    if len == 0 {
        return Err(DetectorError::InvalidConfig(
            "window length must be at least 1".into(),
        ));
    }
    let (rows, features) = series.dim();
    let count = rows.saturating_sub(len);
    let mut inputs = Array3::<f64>::zeros((count, len, features));
    let mut targets = Array3::<f64>::zeros((count, len, features));

    for i in 0..count {
        let window = series.slice(s![i..i + len, ..]);
        inputs.slice_mut(s![i, .., ..]).assign(&window);
        match mode {
            TargetMode::Reconstruct => targets.slice_mut(s![i, .., ..]).assign(&window),
            TargetMode::NextValue => {
                let next = series.row(i + len);
                for t in 0..len {
                    targets.slice_mut(s![i, t, ..]).assign(&next);
                }
            }
        }
    }

    Ok(Windows {
        inputs,
        targets,
        len,
    })
}

/// Lays a univariate series out as a single-feature column.
pub fn column(values: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((values.len(), 1), |(i, _)| values[i])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Array2<f64> {
        column(&(0..n).map(|i| i as f64).collect::<Vec<_>>())
    }

    #[test]
    fn produces_len_minus_window_windows() {
        for n in [2usize, 5, 31, 64] {
            for w in 1..n {
                let out = windows(&ramp(n), w, TargetMode::Reconstruct).unwrap();
                assert_eq!(out.count(), n - w, "n={} w={}", n, w);
            }
        }
    }

    #[test]
    fn window_i_matches_series_slice() {
        let series = ramp(12);
        let out = windows(&series, 4, TargetMode::Reconstruct).unwrap();
        for i in 0..out.count() {
            for t in 0..4 {
                assert_eq!(out.inputs[[i, t, 0]], (i + t) as f64);
            }
        }
        assert_eq!(out.inputs, out.targets);
        assert_eq!(out.end_index(0), 3);
    }

    #[test]
    fn short_series_yields_nothing() {
        for n in 0..=5 {
            let out = windows(&ramp(n), 5, TargetMode::Reconstruct).unwrap();
            assert!(out.is_empty());
            assert_eq!(out.inputs.dim(), (0, 5, 1));
        }
    }

    #[test]
    fn zero_length_is_rejected() {
        assert!(windows(&ramp(4), 0, TargetMode::Reconstruct).is_err());
    }

    #[test]
    fn next_value_target_is_broadcast() {
        let out = windows(&ramp(6), 3, TargetMode::NextValue).unwrap();
        assert_eq!(out.count(), 3);
        for i in 0..3 {
            for t in 0..3 {
                assert_eq!(out.targets[[i, t, 0]], (i + 3) as f64);
            }
        }
    }

    #[test]
    fn keeps_every_feature() {
        let series = Array2::from_shape_fn((5, 2), |(r, c)| (r * 10 + c) as f64);
        let out = windows(&series, 2, TargetMode::Reconstruct).unwrap();
        assert_eq!(out.inputs.dim(), (3, 2, 2));
        assert_eq!(out.inputs[[2, 1, 1]], 31.0);
    }
}
