//! Bagged CART ensembles for health classification and throughput regression.

use crate::dataset::{FeatureMatrix, N_FEATURES};
use crate::error::{ModelError, ModelResult};
use crate::evaluation::running_mean;
use crate::tree::{DecisionTree, Targets, TreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How many candidate features each split examines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least one.
    Sqrt,
    /// Every candidate feature.
    All,
}

impl MaxFeatures {
    fn resolve(self, n_features: usize) -> usize {
        match self {
            Self::Sqrt => ((n_features as f64).sqrt().floor() as usize).max(1),
            Self::All => n_features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl ForestParams {
    /// 100 trees, depth 10, `sqrt` features per split.
    #[must_use]
    pub fn classifier() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            seed: 42,
        }
    }

    /// Same as [`ForestParams::classifier`] but every feature is a candidate.
    #[must_use]
    pub fn regressor() -> Self {
        Self { max_features: MaxFeatures::All, ..Self::classifier() }
    }

    pub fn validate(&self) -> ModelResult<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::InvalidConfig("n_estimators must be >= 1".to_string()));
        }
        if self.max_depth == 0 {
            return Err(ModelError::InvalidConfig("max_depth must be >= 1".to_string()));
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::InvalidConfig("min_samples_split must be >= 2".to_string()));
        }
        if self.min_samples_leaf == 0 {
            return Err(ModelError::InvalidConfig("min_samples_leaf must be >= 1".to_string()));
        }
        Ok(())
    }

    fn tree_params(&self, n_features: usize) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features.resolve(n_features),
        }
    }
}

fn grow_forest(
    rows: &[[f64; N_FEATURES]],
    targets: Targets<'_>,
    features: &[usize],
    params: &ForestParams,
) -> Vec<DecisionTree> {
    let tree_params = params.tree_params(features.len());
    let mut rng = StdRng::seed_from_u64(params.seed);
    (0..params.n_estimators)
        .map(|_| {
            let bootstrap: Vec<usize> = (0..rows.len()).map(|_| rng.gen_range(0..rows.len())).collect();
            DecisionTree::fit(rows, targets, bootstrap, features, &tree_params, &mut rng)
        })
        .collect()
}

/// Mean of per-tree normalized importances over trees that split at least
/// once, renormalized to sum to one.
fn forest_importances(trees: &[DecisionTree]) -> [f64; N_FEATURES] {
    let mut out = [0.0; N_FEATURES];
    let split_trees: Vec<_> = trees.iter().filter(|t| t.node_count() > 1).collect();
    if split_trees.is_empty() {
        return out;
    }
    for tree in &split_trees {
        for (o, v) in out.iter_mut().zip(tree.feature_importances()) {
            *o += v;
        }
    }
    let total: f64 = out.iter().sum();
    if total > 0.0 {
        for o in &mut out {
            *o /= total;
        }
    }
    out
}

fn validate_features(features: &[usize]) -> ModelResult<()> {
    if features.is_empty() || features.iter().any(|&f| f >= N_FEATURES) {
        return Err(ModelError::InvalidConfig(format!("invalid feature subset: {features:?}")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: ForestParams,
    n_classes: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForestClassifier {
    /// Fits on class indices `y` in `0..n_classes`.
    pub fn fit(matrix: &FeatureMatrix, y: &[usize], n_classes: usize, params: ForestParams) -> ModelResult<Self> {
        params.validate()?;
        if matrix.is_empty() {
            return Err(ModelError::training("cannot fit a classifier on an empty batch", matrix.summary()));
        }
        if y.len() != matrix.len() || y.iter().any(|&c| c >= n_classes) {
            return Err(ModelError::training("class labels do not match the feature rows", matrix.summary()));
        }
        let features: Vec<usize> = (0..N_FEATURES).collect();
        let trees = grow_forest(matrix.rows(), Targets::Classes { y, n_classes }, &features, &params);
        Ok(Self { params, n_classes, trees })
    }

    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    #[must_use]
    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// Mean class probabilities across trees, one vector per row.
    #[must_use]
    pub fn predict_proba(&self, matrix: &FeatureMatrix) -> Vec<Vec<f64>> {
        let n_trees = self.trees.len() as f64;
        matrix
            .rows()
            .iter()
            .map(|x| {
                let mut proba = vec![0.0; self.n_classes];
                for tree in &self.trees {
                    for (p, v) in proba.iter_mut().zip(tree.predict(x)) {
                        *p += v;
                    }
                }
                proba.iter_mut().for_each(|p| *p /= n_trees);
                proba
            })
            .collect()
    }

    /// Most probable class per row; ties go to the lower class index.
    #[must_use]
    pub fn predict(&self, matrix: &FeatureMatrix) -> Vec<usize> {
        self.predict_proba(matrix).iter().map(|p| argmax(p)).collect()
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.trees.iter().all(DecisionTree::is_finite)
    }

    #[must_use]
    pub fn feature_importances(&self) -> [f64; N_FEATURES] {
        forest_importances(&self.trees)
    }
}

pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestRegressor {
    params: ForestParams,
    /// Feature columns the trees may split on.
    features: Vec<usize>,
    trees: Vec<DecisionTree>,
}

impl RandomForestRegressor {
    /// Fits on every canonical feature.
    pub fn fit(matrix: &FeatureMatrix, y: &[f64], params: ForestParams) -> ModelResult<Self> {
        let features: Vec<usize> = (0..N_FEATURES).collect();
        Self::fit_on(matrix, y, &features, params)
    }

    /// Fits using only the given feature columns as split candidates.
    pub fn fit_on(matrix: &FeatureMatrix, y: &[f64], features: &[usize], params: ForestParams) -> ModelResult<Self> {
        params.validate()?;
        validate_features(features)?;
        if matrix.is_empty() {
            return Err(ModelError::training("cannot fit a regressor on an empty batch", matrix.summary()));
        }
        if y.len() != matrix.len() || y.iter().any(|v| !v.is_finite()) {
            return Err(ModelError::training("regression targets do not match the feature rows", matrix.summary()));
        }
        let trees = grow_forest(matrix.rows(), Targets::Values(y), features, &params);
        Ok(Self { params, features: features.to_vec(), trees })
    }

    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    #[must_use]
    pub fn features(&self) -> &[usize] {
        &self.features
    }

    /// Mean tree prediction per row.
    #[must_use]
    pub fn predict(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix
            .rows()
            .iter()
            .map(|x| running_mean(self.trees.iter().map(|t| t.predict(x)[0])))
            .collect()
    }

    pub(crate) fn is_finite(&self) -> bool {
        self.trees.iter().all(DecisionTree::is_finite)
    }

    #[must_use]
    pub fn feature_importances(&self) -> [f64; N_FEATURES] {
        forest_importances(&self.trees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_blobs() -> (FeatureMatrix, Vec<usize>) {
        let mut rows = Vec::new();
        let mut y = Vec::new();
        for i in 0..30_i32 {
            let jitter = f64::from(i % 5);
            rows.push([40.0 + jitter, 100.0 + jitter, 60.0 - jitter, 0.01]);
            y.push(0);
            rows.push([92.0 + jitter, 300.0 + jitter, 10.0 + jitter, 0.08]);
            y.push(1);
        }
        (FeatureMatrix::new(rows), y)
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(4), 2);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
        assert_eq!(MaxFeatures::All.resolve(3), 3);
    }

    #[test]
    fn test_classifier_learns_separable_blobs() {
        let (matrix, y) = two_blobs();
        let clf = RandomForestClassifier::fit(&matrix, &y, 2, ForestParams::classifier()).unwrap();
        assert_eq!(clf.predict(&matrix), y);
        for proba in clf.predict_proba(&matrix) {
            assert!((proba.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (matrix, y) = two_blobs();
        let clf = RandomForestClassifier::fit(&matrix, &y, 2, ForestParams::classifier()).unwrap();
        let sum: f64 = clf.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);

        let targets: Vec<f64> = matrix.rows().iter().map(|r| r[2]).collect();
        let reg = RandomForestRegressor::fit(&matrix, &targets, ForestParams::regressor()).unwrap();
        let sum: f64 = reg.feature_importances().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_regressor_tracks_target() {
        let rows: Vec<[f64; N_FEATURES]> =
            (0..50_i32).map(|i| [f64::from(i), 100.0, 2.0 * f64::from(i), 0.01]).collect();
        let matrix = FeatureMatrix::new(rows);
        let y: Vec<f64> = matrix.rows().iter().map(|r| r[2]).collect();
        let reg = RandomForestRegressor::fit(&matrix, &y, ForestParams::regressor()).unwrap();
        let pred = reg.predict(&matrix);
        for (p, t) in pred.iter().zip(&y) {
            assert!((p - t).abs() < 15.0, "pred {p} target {t}");
        }
    }

    #[test]
    fn test_regressor_feature_subset_zeroes_excluded_importance() {
        let rows: Vec<[f64; N_FEATURES]> =
            (0..40_i32).map(|i| [f64::from(i), f64::from(i % 7), 3.0 * f64::from(i), 0.01]).collect();
        let matrix = FeatureMatrix::new(rows);
        let y: Vec<f64> = matrix.rows().iter().map(|r| r[2]).collect();
        let reg = RandomForestRegressor::fit_on(&matrix, &y, &[0, 1, 3], ForestParams::regressor()).unwrap();
        assert_eq!(reg.features(), &[0, 1, 3]);
        assert_eq!(reg.feature_importances()[2], 0.0);
    }

    #[test]
    fn test_rejects_empty_and_mismatched_input() {
        let empty = FeatureMatrix::default();
        assert!(matches!(
            RandomForestClassifier::fit(&empty, &[], 1, ForestParams::classifier()),
            Err(ModelError::Training { .. })
        ));
        let (matrix, _) = two_blobs();
        assert!(RandomForestClassifier::fit(&matrix, &[0, 1], 2, ForestParams::classifier()).is_err());
        assert!(RandomForestRegressor::fit_on(&matrix, &vec![0.0; matrix.len()], &[], ForestParams::regressor()).is_err());
    }

    #[test]
    fn test_argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), 1);
    }
}
