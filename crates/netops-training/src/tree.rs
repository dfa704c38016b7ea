//! CART decision trees used as random forest members.

use crate::dataset::N_FEATURES;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Nodes at or below this impurity are treated as pure.
const PURE_EPSILON: f64 = 1e-12;

/// Training targets for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Targets<'a> {
    /// Class indices in `0..n_classes`; split quality is Gini impurity.
    Classes { y: &'a [usize], n_classes: usize },
    /// Continuous values; split quality is squared error.
    Values(&'a [f64]),
}

impl Targets<'_> {
    fn stats(&self) -> NodeStats {
        match self {
            Self::Classes { n_classes, .. } => NodeStats::Counts(vec![0.0; *n_classes]),
            Self::Values(_) => NodeStats::Moments { n: 0.0, mean: 0.0, m2: 0.0 },
        }
    }
}

/// Running sufficient statistics for a set of samples. Moments are kept
/// as a running mean and sum of squared deviations, so targets near
/// `f64::MAX` do not overflow.
#[derive(Debug, Clone)]
enum NodeStats {
    Counts(Vec<f64>),
    Moments { n: f64, mean: f64, m2: f64 },
}

impl NodeStats {
    fn add(&mut self, targets: &Targets<'_>, i: usize) {
        match (self, targets) {
            (Self::Counts(counts), Targets::Classes { y, .. }) => counts[y[i]] += 1.0,
            (Self::Moments { n, mean, m2 }, Targets::Values(y)) => {
                *n += 1.0;
                let delta = y[i] - *mean;
                *mean += delta / *n;
                *m2 += delta * (y[i] - *mean);
            }
            _ => {}
        }
    }

    fn remove(&mut self, targets: &Targets<'_>, i: usize) {
        match (self, targets) {
            (Self::Counts(counts), Targets::Classes { y, .. }) => counts[y[i]] -= 1.0,
            (Self::Moments { n, mean, m2 }, Targets::Values(y)) => {
                *n -= 1.0;
                if *n <= 0.0 {
                    *n = 0.0;
                    *mean = 0.0;
                    *m2 = 0.0;
                } else {
                    let delta = y[i] - *mean;
                    *mean -= delta / *n;
                    *m2 = (*m2 - delta * (y[i] - *mean)).max(0.0);
                }
            }
            _ => {}
        }
    }

    fn count(&self) -> f64 {
        match self {
            Self::Counts(counts) => counts.iter().sum(),
            Self::Moments { n, .. } => *n,
        }
    }

    fn impurity(&self) -> f64 {
        let n = self.count();
        if n <= 0.0 {
            return 0.0;
        }
        match self {
            Self::Counts(counts) => 1.0 - counts.iter().map(|c| (c / n) * (c / n)).sum::<f64>(),
            Self::Moments { m2, .. } => (m2 / n).max(0.0),
        }
    }

    /// Leaf output: class fractions, or the mean as a single value.
    fn value(&self) -> Vec<f64> {
        let n = self.count();
        match self {
            Self::Counts(counts) => counts.iter().map(|c| if n > 0.0 { c / n } else { 0.0 }).collect(),
            Self::Moments { mean, .. } => vec![if n > 0.0 { *mean } else { 0.0 }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split.
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum TreeNode {
    Leaf { value: Vec<f64> },
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    /// Weighted child impurity, `n_left * imp_left + n_right * imp_right`.
    child_impurity: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct DecisionTree {
    nodes: Vec<TreeNode>,
    /// Total impurity decrease per feature, unnormalized.
    impurity_decrease: [f64; N_FEATURES],
}

impl DecisionTree {
    pub(crate) fn fit(
        rows: &[[f64; N_FEATURES]],
        targets: Targets<'_>,
        sample: Vec<usize>,
        features: &[usize],
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut builder = Builder { rows, targets, features, params, rng, nodes: Vec::new(), decrease: [0.0; N_FEATURES] };
        builder.grow(sample, 0);
        Self { nodes: builder.nodes, impurity_decrease: builder.decrease }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn predict(&self, x: &[f64; N_FEATURES]) -> &[f64] {
        let mut node = 0;
        loop {
            match &self.nodes[node] {
                TreeNode::Leaf { value } => return value,
                TreeNode::Split { feature, threshold, left, right } => {
                    node = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// True when every leaf value and split threshold is finite, which is
    /// what a JSON round trip of the tree requires.
    pub(crate) fn is_finite(&self) -> bool {
        self.nodes.iter().all(|node| match node {
            TreeNode::Leaf { value } => value.iter().all(|v| v.is_finite()),
            TreeNode::Split { threshold, .. } => threshold.is_finite(),
        })
    }

    /// Impurity-based importances normalized to sum to one, or all zeros
    /// when the tree never split.
    pub(crate) fn feature_importances(&self) -> [f64; N_FEATURES] {
        let total: f64 = self.impurity_decrease.iter().sum();
        let mut out = [0.0; N_FEATURES];
        if total > 0.0 {
            for (o, d) in out.iter_mut().zip(self.impurity_decrease) {
                *o = d / total;
            }
        }
        out
    }
}

struct Builder<'a, 'r> {
    rows: &'a [[f64; N_FEATURES]],
    targets: Targets<'a>,
    features: &'a [usize],
    params: &'a TreeParams,
    rng: &'r mut StdRng,
    nodes: Vec<TreeNode>,
    decrease: [f64; N_FEATURES],
}

impl Builder<'_, '_> {
    fn grow(&mut self, idx: Vec<usize>, depth: usize) -> usize {
        let mut stats = self.targets.stats();
        for &i in &idx {
            stats.add(&self.targets, i);
        }
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode::Leaf { value: stats.value() });

        let impurity = stats.impurity();
        if depth >= self.params.max_depth
            || idx.len() < self.params.min_samples_split
            || idx.len() < 2 * self.params.min_samples_leaf
            || impurity <= PURE_EPSILON
        {
            return node_id;
        }

        let Some(split) = self.best_split(&idx) else {
            return node_id;
        };
        let n = idx.len() as f64;
        self.decrease[split.feature] += (n * impurity - split.child_impurity).max(0.0);

        let left = self.grow(split.left, depth + 1);
        let right = self.grow(split.right, depth + 1);
        self.nodes[node_id] = TreeNode::Split { feature: split.feature, threshold: split.threshold, left, right };
        node_id
    }

    /// Draws candidate features in random order; constant features do not
    /// count toward `max_features`.
    fn best_split(&mut self, idx: &[usize]) -> Option<SplitCandidate> {
        let mut order = self.features.to_vec();
        order.shuffle(&mut *self.rng);

        let mut best: Option<SplitCandidate> = None;
        let mut visited = 0;
        for feature in order {
            if visited >= self.params.max_features {
                break;
            }
            let mut sorted = idx.to_vec();
            sorted.sort_by(|&a, &b| self.rows[a][feature].total_cmp(&self.rows[b][feature]));
            let first = self.rows[sorted[0]][feature];
            let last = self.rows[sorted[sorted.len() - 1]][feature];
            if first >= last {
                continue;
            }
            visited += 1;

            if let Some((pos, threshold, child_impurity)) = self.scan_feature(&sorted, feature) {
                if best.as_ref().is_none_or(|b| child_impurity < b.child_impurity) {
                    let right = sorted.split_off(pos);
                    best = Some(SplitCandidate { feature, threshold, child_impurity, left: sorted, right });
                }
            }
        }
        best
    }

    /// Sweeps the sorted samples, returning the split position, midpoint
    /// threshold and weighted child impurity of the best cut.
    fn scan_feature(&self, sorted: &[usize], feature: usize) -> Option<(usize, f64, f64)> {
        let mut left = self.targets.stats();
        let mut right = self.targets.stats();
        for &i in sorted {
            right.add(&self.targets, i);
        }

        let min_leaf = self.params.min_samples_leaf;
        let mut best: Option<(usize, f64, f64)> = None;
        for pos in 1..sorted.len() {
            let moved = sorted[pos - 1];
            left.add(&self.targets, moved);
            right.remove(&self.targets, moved);

            let prev = self.rows[moved][feature];
            let next = self.rows[sorted[pos]][feature];
            if prev >= next || pos < min_leaf || sorted.len() - pos < min_leaf {
                continue;
            }
            let child = left.count() * left.impurity() + right.count() * right.impurity();
            if best.is_none_or(|(_, _, b)| child < b) {
                let mut threshold = prev / 2.0 + next / 2.0;
                if threshold >= next || !threshold.is_finite() {
                    threshold = prev;
                }
                best = Some((pos, threshold, child));
            }
        }
        best
    }
}
