//! Model artifacts and the classifier capability set
//!
//! The artifact is a JSON document produced by the offline training step. It
//! carries a format version, optionally the feature names the model was
//! fitted on, and one estimator tagged by `kind`:
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "kind": "logistic_regression",
//!   "feature_names": ["radius_worst", "area_worst"],
//!   "classes": [0, 1],
//!   "coef": [[0.8, 0.004]],
//!   "intercept": [-16.2]
//! }
//! ```
//!
//! Every estimator predicts labels. Probability estimation is optional and
//! advertised through [`Classifier::supports_proba`].

use serde::{Deserialize, Serialize};

/// Artifact format understood by this build.
pub const SUPPORTED_FORMAT_VERSION: u32 = 1;

/// A class label as written by the training process (integer or string).
pub type Label = serde_json::Value;

/// A fitted classifier.
///
/// `predict_index` is always available. `predict_proba` returns one
/// probability per entry of [`classes`](Classifier::classes), in the same
/// order, when the estimator supports it.
pub trait Classifier: Send + Sync {
    fn classes(&self) -> &[Label];

    /// Width of the feature vector the model expects.
    fn n_features(&self) -> usize;

    /// Index into `classes()` of the predicted label.
    fn predict_index(&self, row: &[f64]) -> usize;

    fn supports_proba(&self) -> bool {
        false
    }

    fn predict_proba(&self, _row: &[f64]) -> Option<Vec<f64>> {
        None
    }
}

/// Structural problems found in an artifact at load time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("unsupported model format version {found} (this build reads version {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("invalid {kind} model: {reason}")]
    Invalid { kind: &'static str, reason: String },
}

/// A loaded model artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// Feature names the model was fitted on, if the trainer recorded them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(flatten)]
    pub estimator: Estimator,
}

/// Supported estimator families.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression(LinearModel),
    LinearSvc(LinearModel),
    DecisionTree(DecisionTree),
    RandomForest(RandomForest),
}

impl ModelArtifact {
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn kind(&self) -> &'static str {
        self.estimator.kind()
    }

    /// Check the artifact is internally consistent.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.format_version != SUPPORTED_FORMAT_VERSION {
            return Err(ModelError::UnsupportedVersion {
                found: self.format_version,
                expected: SUPPORTED_FORMAT_VERSION,
            });
        }

        let kind = self.kind();
        let invalid = |reason: String| ModelError::Invalid { kind, reason };

        match &self.estimator {
            Estimator::LogisticRegression(m) | Estimator::LinearSvc(m) => m.validate(),
            Estimator::DecisionTree(t) => t.validate(),
            Estimator::RandomForest(f) => f.validate(),
        }
        .map_err(invalid)?;

        if let Some(names) = &self.feature_names {
            if names.len() != self.n_features() {
                return Err(invalid(format!(
                    "{} feature names recorded for a model over {} features",
                    names.len(),
                    self.n_features()
                )));
            }
        }

        Ok(())
    }
}

impl Estimator {
    pub fn kind(&self) -> &'static str {
        match self {
            Estimator::LogisticRegression(_) => "logistic_regression",
            Estimator::LinearSvc(_) => "linear_svc",
            Estimator::DecisionTree(_) => "decision_tree",
            Estimator::RandomForest(_) => "random_forest",
        }
    }
}

impl Classifier for ModelArtifact {
    fn classes(&self) -> &[Label] {
        match &self.estimator {
            Estimator::LogisticRegression(m) | Estimator::LinearSvc(m) => &m.classes,
            Estimator::DecisionTree(t) => &t.classes,
            Estimator::RandomForest(f) => &f.classes,
        }
    }

    fn n_features(&self) -> usize {
        match &self.estimator {
            Estimator::LogisticRegression(m) | Estimator::LinearSvc(m) => m.n_features(),
            Estimator::DecisionTree(t) => t.n_features,
            Estimator::RandomForest(f) => f.n_features,
        }
    }

    fn predict_index(&self, row: &[f64]) -> usize {
        match &self.estimator {
            Estimator::LogisticRegression(m) | Estimator::LinearSvc(m) => m.predict_index(row),
            Estimator::DecisionTree(t) => argmax(&t.predict_proba(row)),
            Estimator::RandomForest(f) => argmax(&f.predict_proba(row)),
        }
    }

    fn supports_proba(&self) -> bool {
        !matches!(self.estimator, Estimator::LinearSvc(_))
    }

    fn predict_proba(&self, row: &[f64]) -> Option<Vec<f64>> {
        match &self.estimator {
            Estimator::LogisticRegression(m) => Some(m.logistic_proba(row)),
            Estimator::LinearSvc(_) => None,
            Estimator::DecisionTree(t) => Some(t.predict_proba(row)),
            Estimator::RandomForest(f) => Some(f.predict_proba(row)),
        }
    }
}

// =============================================================================
// Linear models
// =============================================================================

/// Linear decision functions, one row of `coef` per function.
///
/// Binary problems carry a single decision function whose positive side is
/// `classes[1]`. Multiclass problems carry one function per class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub classes: Vec<Label>,
    pub coef: Vec<Vec<f64>>,
    pub intercept: Vec<f64>,
}

impl LinearModel {
    fn n_features(&self) -> usize {
        self.coef.first().map_or(0, Vec::len)
    }

    fn is_binary(&self) -> bool {
        self.coef.len() == 1
    }

    fn validate(&self) -> Result<(), String> {
        let n_classes = self.classes.len();
        if n_classes < 2 {
            return Err(format!("needs at least 2 classes, found {}", n_classes));
        }

        let expected_rows = if n_classes == 2 { 1 } else { n_classes };
        if self.coef.len() != expected_rows {
            return Err(format!(
                "{} classes need {} coefficient rows, found {}",
                n_classes,
                expected_rows,
                self.coef.len()
            ));
        }
        if self.intercept.len() != self.coef.len() {
            return Err(format!(
                "{} intercepts for {} coefficient rows",
                self.intercept.len(),
                self.coef.len()
            ));
        }

        let width = self.n_features();
        if width == 0 {
            return Err("coefficient rows are empty".into());
        }
        if self.coef.iter().any(|r| r.len() != width) {
            return Err("coefficient rows have different widths".into());
        }

        Ok(())
    }

    fn decision(&self, row: &[f64]) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(w, b)| w.iter().zip(row).map(|(w, x)| w * x).sum::<f64>() + b)
            .collect()
    }

    fn predict_index(&self, row: &[f64]) -> usize {
        let scores = self.decision(row);
        if self.is_binary() {
            usize::from(scores[0] > 0.0)
        } else {
            argmax(&scores)
        }
    }

    fn logistic_proba(&self, row: &[f64]) -> Vec<f64> {
        let scores = self.decision(row);
        if self.is_binary() {
            let p = sigmoid(scores[0]);
            vec![1.0 - p, p]
        } else {
            softmax(&scores)
        }
    }
}

// =============================================================================
// Trees
// =============================================================================

/// A node in a flattened tree. Node 0 is the root.
///
/// Rows with `x[feature] <= threshold` go left. Leaves hold per-class
/// weights (sample counts or fractions) in `classes` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: Vec<f64>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub classes: Vec<Label>,
    pub n_features: usize,
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("no classes".into());
        }
        validate_nodes(&self.nodes, self.n_features, self.classes.len())
    }

    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        normalize(leaf_value(&self.nodes, row))
    }
}

/// Bagged trees; probabilities are the mean of the per-tree probabilities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub classes: Vec<Label>,
    pub n_features: usize,
    pub trees: Vec<Tree>,
}

impl RandomForest {
    fn validate(&self) -> Result<(), String> {
        if self.classes.is_empty() {
            return Err("no classes".into());
        }
        if self.trees.is_empty() {
            return Err("forest has no trees".into());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            validate_nodes(&tree.nodes, self.n_features, self.classes.len())
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            let proba = normalize(leaf_value(&tree.nodes, row));
            for (a, p) in acc.iter_mut().zip(proba) {
                *a += p;
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }
}

fn leaf_value<'a>(nodes: &'a [TreeNode], row: &[f64]) -> &'a [f64] {
    let mut idx = 0;
    loop {
        match &nodes[idx] {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                idx = if row[*feature] <= *threshold {
                    *left
                } else {
                    *right
                };
            }
            TreeNode::Leaf { value } => return value,
        }
    }
}

// Children must come after their parent, which also rules out cycles.
fn validate_nodes(nodes: &[TreeNode], n_features: usize, n_classes: usize) -> Result<(), String> {
    if nodes.is_empty() {
        return Err("tree has no nodes".into());
    }

    let n_nodes = nodes.len();
    for (idx, node) in nodes.iter().enumerate() {
        match node {
            TreeNode::Split {
                feature,
                threshold,
                left,
                right,
            } => {
                if *feature >= n_features {
                    return Err(format!(
                        "node {} splits on feature {} of {}",
                        idx, feature, n_features
                    ));
                }
                if threshold.is_nan() {
                    return Err(format!("node {} has a NaN threshold", idx));
                }
                for (side, child) in [("left", *left), ("right", *right)] {
                    if child <= idx || child >= n_nodes {
                        return Err(format!(
                            "node {} has {} child {} (tree has {} nodes)",
                            idx, side, child, n_nodes
                        ));
                    }
                }
            }
            TreeNode::Leaf { value } => {
                if value.len() != n_classes {
                    return Err(format!(
                        "leaf {} has {} values for {} classes",
                        idx,
                        value.len(),
                        n_classes
                    ));
                }
                if value.iter().any(|v| !v.is_finite() || *v < 0.0) {
                    return Err(format!("leaf {} has a negative or non-finite value", idx));
                }
            }
        }
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

/// Index of the first maximum.
fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f64 = exps.iter().sum();
    exps.iter().map(|e| e / sum).collect()
}

fn normalize(weights: &[f64]) -> Vec<f64> {
    let sum: f64 = weights.iter().sum();
    if sum > 0.0 {
        weights.iter().map(|w| w / sum).collect()
    } else {
        vec![1.0 / weights.len() as f64; weights.len()]
    }
}
