//! Fitted random forest classifier.
//!
//! Trees are stored as flat node arrays, root first. A split sends a row left
//! when `x[feature] <= threshold`. Class probabilities are the mean over trees
//! of each reached leaf's normalized class weights, and the predicted label is
//! the first class with the highest probability.

use std::collections::HashSet;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

use crate::error::ArtifactError;
use crate::transformer::FeatureVector;

/// Per-class probabilities in the classifier's own label order.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities(Vec<(String, f64)>);

impl ClassProbabilities {
    pub fn new(pairs: Vec<(String, f64)>) -> Self {
        Self(pairs)
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.0.iter().find(|(l, _)| l == label).map(|(_, p)| *p)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(l, p)| (l.as_str(), *p))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.iter().map(|(_, p)| p).sum()
    }

    /// First label with the highest probability.
    pub fn argmax(&self) -> Option<&str> {
        let mut best: Option<&(String, f64)> = None;
        for pair in &self.0 {
            match best {
                Some((_, p)) if pair.1 <= *p => {}
                _ => best = Some(pair),
            }
        }
        best.map(|(l, _)| l.as_str())
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, p) in &self.0 {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

/// Predicted label plus the full distribution it was taken from.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct PredictionResult {
    pub predicted_status: String,
    pub probabilities: ClassProbabilities,
}

/// Unexpected failure while evaluating the classifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("X has {actual} features, but the classifier is expecting {expected} features as input")]
    FeatureCountMismatch { expected: usize, actual: usize },

    #[error("feature {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("classifier produced an empty distribution")]
    EmptyDistribution,
}

/// Decision model over feature vectors.
pub trait Classifier: Send + Sync {
    /// Known labels in authoritative order
    fn classes(&self) -> &[String];

    /// Expected feature vector width
    fn n_features(&self) -> usize;

    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ClassificationError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeSpec {
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

#[derive(Debug, Clone, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<NodeSpec>,
}

/// Exported form of a fitted random forest
#[derive(Debug, Clone, Deserialize)]
pub struct RandomForestSpec {
    pub classes: Vec<String>,
    pub n_features: usize,
    pub trees: Vec<TreeSpec>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Normalized class distribution
    Leaf(Vec<f64>),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn leaf_for(&self, row: &[f64]) -> &[f64] {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => idx = if row[*feature] <= *threshold { *left } else { *right },
                Node::Leaf(dist) => return dist,
            }
        }
    }
}

/// A validated, immutable random forest.
#[derive(Debug, Clone)]
pub struct RandomForest {
    classes: Vec<String>,
    n_features: usize,
    trees: Vec<Tree>,
}

impl RandomForest {
    pub fn from_json(json: &str) -> Result<Self, ArtifactError> {
        let spec: RandomForestSpec = serde_json::from_str(json)?;
        Self::from_spec(spec)
    }

    /// Validate an exported forest.
    ///
    /// Children must come after their parent, which rules out cycles and keeps
    /// every walk finite.
    pub fn from_spec(spec: RandomForestSpec) -> Result<Self, ArtifactError> {
        if spec.classes.is_empty() {
            return Err(ArtifactError::Invalid("classifier has no classes".to_string()));
        }
        let mut labels = HashSet::with_capacity(spec.classes.len());
        if let Some(dup) = spec.classes.iter().find(|c| !labels.insert(c.as_str())) {
            return Err(ArtifactError::Invalid(format!("duplicate class label '{}'", dup)));
        }
        if spec.trees.is_empty() {
            return Err(ArtifactError::Invalid("classifier has no trees".to_string()));
        }
        if spec.n_features == 0 {
            return Err(ArtifactError::Invalid("classifier expects no features".to_string()));
        }

        let n_classes = spec.classes.len();
        let mut trees = Vec::with_capacity(spec.trees.len());

        for (t, tree) in spec.trees.into_iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ArtifactError::Invalid(format!("tree {} has no nodes", t)));
            }
            let n_nodes = tree.nodes.len();
            let mut nodes = Vec::with_capacity(n_nodes);

            for (i, node) in tree.nodes.into_iter().enumerate() {
                let invalid = |msg: String| ArtifactError::Invalid(format!("tree {} node {}: {}", t, i, msg));
                nodes.push(match node {
                    NodeSpec::Split {
                        feature,
                        threshold,
                        left,
                        right,
                    } => {
                        if feature >= spec.n_features {
                            return Err(invalid(format!(
                                "feature {} out of range for {} features",
                                feature, spec.n_features
                            )));
                        }
                        if !threshold.is_finite() {
                            return Err(invalid("non-finite threshold".to_string()));
                        }
                        for child in [left, right] {
                            if child <= i || child >= n_nodes {
                                return Err(invalid(format!("child index {} out of order", child)));
                            }
                        }
                        Node::Split {
                            feature,
                            threshold,
                            left,
                            right,
                        }
                    }
                    NodeSpec::Leaf { value } => {
                        if value.len() != n_classes {
                            return Err(invalid(format!(
                                "leaf has {} values for {} classes",
                                value.len(),
                                n_classes
                            )));
                        }
                        let total: f64 = value.iter().sum();
                        if value.iter().any(|v| !v.is_finite() || *v < 0.0) || total <= 0.0 {
                            return Err(invalid("leaf weights must be non-negative with a positive sum".to_string()));
                        }
                        Node::Leaf(value.iter().map(|v| v / total).collect())
                    }
                });
            }

            trees.push(Tree { nodes });
        }

        Ok(Self {
            classes: spec.classes,
            n_features: spec.n_features,
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Mean leaf distribution over all trees.
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, ClassificationError> {
        let row = features.as_slice();
        if row.len() != self.n_features {
            return Err(ClassificationError::FeatureCountMismatch {
                expected: self.n_features,
                actual: row.len(),
            });
        }
        if let Some(index) = row.iter().position(|x| !x.is_finite()) {
            return Err(ClassificationError::NonFinite { index });
        }

        let mut proba = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (acc, p) in proba.iter_mut().zip(tree.leaf_for(row)) {
                *acc += p;
            }
        }
        let n = self.trees.len() as f64;
        proba.iter_mut().for_each(|p| *p /= n);
        Ok(proba)
    }
}

impl Classifier for RandomForest {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict(&self, features: &FeatureVector) -> Result<PredictionResult, ClassificationError> {
        let proba = self.predict_proba(features)?;
        let probabilities = ClassProbabilities::new(self.classes.iter().cloned().zip(proba).collect());
        let predicted_status = probabilities
            .argmax()
            .ok_or(ClassificationError::EmptyDistribution)?
            .to_string();

        Ok(PredictionResult {
            predicted_status,
            probabilities,
        })
    }
}
