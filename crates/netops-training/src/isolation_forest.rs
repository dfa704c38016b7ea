//! Isolation forest: unsupervised anomaly scoring by random partitioning.
//!
//! Anomalous rows are isolated in fewer random splits than normal rows, so
//! their average path length across the ensemble is shorter.

use crate::dataset::{FeatureMatrix, N_FEATURES};
use crate::error::{ModelError, ModelResult};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IsolationForestParams {
    pub n_estimators: usize,
    /// Expected fraction of anomalous rows, in (0, 0.5].
    pub contamination: f64,
    /// Upper bound on rows drawn per tree.
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for IsolationForestParams {
    fn default() -> Self {
        Self { n_estimators: 200, contamination: 0.02, max_samples: 256, seed: 42 }
    }
}

impl IsolationForestParams {
    pub fn validate(&self) -> ModelResult<()> {
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(ModelError::InvalidConfig(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidConfig("n_estimators must be >= 1".to_string()));
        }
        if self.max_samples < 2 {
            return Err(ModelError::InvalidConfig("max_samples must be >= 2".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Leaf { size: usize },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(rows: &[[f64; N_FEATURES]], sample: Vec<usize>, height_limit: usize, rng: &mut StdRng) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        tree.grow(rows, sample, 0, height_limit, rng);
        tree
    }

    fn grow(
        &mut self,
        rows: &[[f64; N_FEATURES]],
        idx: Vec<usize>,
        depth: usize,
        height_limit: usize,
        rng: &mut StdRng,
    ) -> usize {
        let node_id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: idx.len() });
        if depth >= height_limit || idx.len() <= 1 {
            return node_id;
        }

        let mut ranges = Vec::with_capacity(N_FEATURES);
        for feature in 0..N_FEATURES {
            let (lo, hi) = idx.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(rows[i][feature]), hi.max(rows[i][feature]))
            });
            if hi > lo {
                ranges.push((feature, lo, hi));
            }
        }
        if ranges.is_empty() {
            return node_id;
        }

        let (feature, lo, hi) = ranges[rng.gen_range(0..ranges.len())];
        let threshold = uniform_between(lo, hi, rng);
        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| rows[i][feature] <= threshold);

        let left = self.grow(rows, left_idx, depth + 1, height_limit, rng);
        let right = self.grow(rows, right_idx, depth + 1, height_limit, rng);
        self.nodes[node_id] = Node::Split { feature, threshold, left, right };
        node_id
    }

    fn path_length(&self, x: &[f64; N_FEATURES]) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split { feature, threshold, left, right } => {
                    node = if x[*feature] <= *threshold { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Uniform draw from `[lo, hi)` for any finite `lo < hi`. The span is
/// halved so `hi - lo` never overflows, e.g. for `-f64::MAX..f64::MAX`.
fn uniform_between(lo: f64, hi: f64, rng: &mut StdRng) -> f64 {
    let u: f64 = rng.gen_range(0.0..1.0);
    let step = u * (hi / 2.0 - lo / 2.0);
    let t = lo + step + step;
    if t < hi { t.max(lo) } else { lo }
}

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Linear-interpolated percentile of unsorted values, `q` in [0, 100].
fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (pos - lo as f64) * (sorted[hi] - sorted[lo])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    params: IsolationForestParams,
    subsample_size: usize,
    offset: f64,
    trees: Vec<IsolationTree>,
}

impl IsolationForest {
    /// Fits the ensemble and calibrates the decision offset so that roughly
    /// `contamination` of the training rows fall below zero.
    pub fn fit(matrix: &FeatureMatrix, params: IsolationForestParams) -> ModelResult<Self> {
        params.validate()?;
        let rows = matrix.rows();
        if rows.is_empty() {
            return Err(ModelError::training("cannot fit on an empty batch", matrix.summary()));
        }
        let all_constant = (0..N_FEATURES).all(|f| rows.iter().all(|r| r[f] == rows[0][f]));
        if all_constant {
            return Err(ModelError::training("every feature is constant across the batch", matrix.summary()));
        }

        let subsample_size = params.max_samples.min(rows.len());
        let height_limit = (subsample_size as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(params.seed);

        let trees = (0..params.n_estimators)
            .map(|_| {
                let sample = rand::seq::index::sample(&mut rng, rows.len(), subsample_size).into_vec();
                IsolationTree::fit(rows, sample, height_limit, &mut rng)
            })
            .collect();

        let mut forest = Self { params, subsample_size, offset: 0.0, trees };
        let train_scores = forest.score_samples(matrix);
        forest.offset = percentile(&train_scores, 100.0 * params.contamination);
        Ok(forest)
    }

    #[must_use]
    pub fn params(&self) -> &IsolationForestParams {
        &self.params
    }

    #[must_use]
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Opposite of the anomaly score: values near -1 are anomalous, values
    /// near -0.5 or above are normal.
    #[must_use]
    pub fn score_samples(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        let norm = average_path_length(self.subsample_size);
        matrix
            .rows()
            .iter()
            .map(|x| {
                let mean_depth =
                    self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect()
    }

    /// Shifted score: negative means anomalous.
    #[must_use]
    pub fn decision_function(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        self.score_samples(matrix).into_iter().map(|s| s - self.offset).collect()
    }

    /// `-1` for anomalous rows, `1` otherwise.
    #[must_use]
    pub fn predict(&self, matrix: &FeatureMatrix) -> Vec<i32> {
        labels_from_decision(&self.decision_function(matrix))
    }
}

pub(crate) fn labels_from_decision(decision: &[f64]) -> Vec<i32> {
    decision.iter().map(|&d| if d < 0.0 { -1 } else { 1 }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster(n: usize, seed: u64) -> Vec<[f64; N_FEATURES]> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                [
                    rng.gen_range(40.0..60.0),
                    rng.gen_range(140.0..160.0),
                    rng.gen_range(20.0..30.0),
                    rng.gen_range(0.01..0.03),
                ]
            })
            .collect()
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }

    #[test]
    fn test_percentile_interpolates() {
        let v = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(percentile(&v, 0.0), 1.0);
        assert_eq!(percentile(&v, 100.0), 4.0);
        assert!((percentile(&v, 50.0) - 2.5).abs() < 1e-12);
    }

    #[test]
    fn test_outlier_is_flagged() {
        let mut rows = cluster(50, 1);
        rows.push([90.5, 50.0, 5.1, 0.15]);
        let matrix = FeatureMatrix::new(rows);
        let params = IsolationForestParams { contamination: 0.05, ..Default::default() };
        let forest = IsolationForest::fit(&matrix, params).unwrap();

        let labels = forest.predict(&matrix);
        let scores = forest.decision_function(&matrix);
        assert_eq!(labels[50], -1);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        assert_eq!(scores[50], min);
    }

    #[test]
    fn test_anomaly_rate_tracks_contamination() {
        let matrix = FeatureMatrix::new(cluster(500, 7));
        let params = IsolationForestParams { contamination: 0.1, ..Default::default() };
        let forest = IsolationForest::fit(&matrix, params).unwrap();
        let labels = forest.predict(&matrix);
        assert_eq!(labels.len(), 500);
        let rate = labels.iter().filter(|&&l| l == -1).count() as f64 / 500.0;
        assert!((0.05..=0.15).contains(&rate), "rate = {rate}");
    }

    #[test]
    fn test_same_seed_same_model() {
        let matrix = FeatureMatrix::new(cluster(40, 3));
        let a = IsolationForest::fit(&matrix, IsolationForestParams::default()).unwrap();
        let b = IsolationForest::fit(&matrix, IsolationForestParams::default()).unwrap();
        assert_eq!(a.decision_function(&matrix), b.decision_function(&matrix));
    }

    #[test]
    fn test_rejects_degenerate_batches() {
        let empty = FeatureMatrix::default();
        assert!(matches!(
            IsolationForest::fit(&empty, IsolationForestParams::default()),
            Err(ModelError::Training { .. })
        ));

        let constant = FeatureMatrix::new(vec![[1.0, 2.0, 3.0, 0.1]; 10]);
        match IsolationForest::fit(&constant, IsolationForestParams::default()) {
            Err(ModelError::Training { summary, .. }) => assert_eq!(summary.rows, 10),
            other => panic!("expected training error, got {other:?}"),
        }
    }

    #[test]
    fn test_extreme_finite_values_fit_and_score() {
        let mut rows = cluster(10, 7);
        rows.push([-1.7e308, 110.0, 60.0, 0.01]);
        rows.push([1.7e308, 110.0, 60.0, 0.01]);
        let matrix = FeatureMatrix::new(rows);
        let model = IsolationForest::fit(&matrix, IsolationForestParams::default()).unwrap();
        let decision = model.decision_function(&matrix);
        assert_eq!(decision.len(), 12);
        assert!(decision.iter().all(|d| d.is_finite()));
    }

    #[test]
    fn test_uniform_between_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..1000 {
            let t = uniform_between(-f64::MAX, f64::MAX, &mut rng);
            assert!(t.is_finite());
            let t = uniform_between(1.0, 1.0 + f64::EPSILON, &mut rng);
            assert!((1.0..1.0 + f64::EPSILON).contains(&t));
        }
    }

    #[test]
    fn test_rejects_bad_contamination() {
        let matrix = FeatureMatrix::new(cluster(10, 2));
        for contamination in [0.0, 0.6, f64::NAN] {
            let params = IsolationForestParams { contamination, ..Default::default() };
            assert!(matches!(IsolationForest::fit(&matrix, params), Err(ModelError::InvalidConfig(_))));
        }
    }
}
