//! Train/test splitting and held-out evaluation metrics.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Row indices of one train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Splits rows per class so each class contributes `round(test_size * n)`
/// rows to the test side, but never its last training row. Every class in
/// `classes` is therefore present in the training partition.
#[must_use]
pub fn stratified_split(classes: &[usize], test_size: f64, seed: u64) -> TrainTestSplit {
    let mut rng = StdRng::seed_from_u64(seed);
    let n_classes = classes.iter().max().map_or(0, |m| m + 1);
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (row, &class) in classes.iter().enumerate() {
        groups[class].push(row);
    }

    let mut train = Vec::with_capacity(classes.len());
    let mut test = Vec::new();
    for mut group in groups {
        if group.is_empty() {
            continue;
        }
        group.shuffle(&mut rng);
        let wanted = (test_size * group.len() as f64).round() as usize;
        let n_test = wanted.min(group.len() - 1);
        test.extend_from_slice(&group[..n_test]);
        train.extend_from_slice(&group[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    TrainTestSplit { train, test }
}

/// Arithmetic mean kept as a running average, so values near `f64::MAX`
/// do not overflow the way a plain sum would. Zero for no values.
pub(crate) fn running_mean<I: IntoIterator<Item = f64>>(values: I) -> f64 {
    let mut mean = 0.0;
    let mut n = 0.0;
    for v in values {
        n += 1.0;
        mean += v / n - mean / n;
    }
    mean
}

/// Population standard deviation (ddof = 0). Deviations are halved and
/// rescaled before squaring so large finite inputs stay finite.
pub(crate) fn population_std(values: &[f64]) -> f64 {
    let mean = running_mean(values.iter().copied());
    let half: Vec<f64> = values.iter().map(|v| v / 2.0 - mean / 2.0).collect();
    let scale = half.iter().fold(0.0_f64, |m, d| m.max(d.abs()));
    if scale == 0.0 {
        return 0.0;
    }
    2.0 * scale * running_mean(half.iter().map(|d| (d / scale).powi(2))).sqrt()
}

/// Fraction of matching predictions, `None` for an empty test set.
#[must_use]
pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> Option<f64> {
    if y_true.is_empty() {
        return None;
    }
    let hits = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    Some(hits as f64 / y_true.len() as f64)
}

/// Coefficient of determination; `None` with fewer than two samples or
/// when the squared errors overflow.
#[must_use]
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    if y_true.len() < 2 {
        return None;
    }
    let mean = running_mean(y_true.iter().copied());
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return Some(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Some(1.0 - ss_res / ss_tot).filter(|r2| r2.is_finite())
}

/// Root mean squared error; `None` for an empty set or on overflow.
#[must_use]
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> Option<f64> {
    if y_true.is_empty() {
        return None;
    }
    let mse = running_mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)));
    Some(mse.sqrt()).filter(|e| e.is_finite())
}
