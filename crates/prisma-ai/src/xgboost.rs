//! Native inference for XGBoost binary classifiers saved as JSON.
//!
//! Reads the document written by `Booster.save_model("model.json")` and
//! evaluates the tree ensemble directly, without the XGBoost runtime.
//! Only the parts needed for `binary:logistic` gbtree models with numerical
//! splits are supported.

use std::path::Path;

use prisma_core::Code;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::classifier::Classifier;

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("failed to read model {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported objective {0:?}, expected binary:logistic")]
    UnsupportedObjective(String),

    #[error("unsupported booster {0:?}, expected gbtree")]
    UnsupportedBooster(String),

    #[error("invalid learner parameter {name}: {value:?}")]
    InvalidParam { name: &'static str, value: String },

    #[error("tree {tree}: {reason}")]
    InvalidTree { tree: usize, reason: String },
}

// ── JSON document ──

#[derive(Deserialize)]
struct ModelDoc {
    learner: LearnerDoc,
}

#[derive(Deserialize)]
struct LearnerDoc {
    #[serde(default)]
    feature_names: Vec<String>,
    gradient_booster: BoosterDoc,
    objective: ObjectiveDoc,
    learner_model_param: LearnerParamDoc,
}

#[derive(Deserialize)]
struct BoosterDoc {
    name: String,
    model: Option<TreesDoc>,
}

#[derive(Deserialize)]
struct TreesDoc {
    trees: Vec<TreeDoc>,
}

#[derive(Deserialize)]
struct TreeDoc {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i32>,
    /// Split threshold for internal nodes, leaf value for leaves.
    split_conditions: Vec<f32>,
    #[serde(default)]
    split_type: Vec<i32>,
}

#[derive(Deserialize)]
struct ObjectiveDoc {
    name: String,
}

#[derive(Deserialize)]
struct LearnerParamDoc {
    base_score: String,
    num_feature: String,
}

// ── Compiled ensemble ──

#[derive(Debug, Clone, Copy)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
    },
    Leaf(f32),
}

#[derive(Debug, Clone)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_doc(index: usize, doc: TreeDoc, num_feature: usize) -> Result<Self, ModelLoadError> {
        let invalid = |reason: String| ModelLoadError::InvalidTree {
            tree: index,
            reason,
        };

        let n = doc.left_children.len();
        if n == 0 {
            return Err(invalid("no nodes".to_string()));
        }
        if [
            doc.right_children.len(),
            doc.split_indices.len(),
            doc.split_conditions.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            return Err(invalid("node arrays differ in length".to_string()));
        }
        if doc.split_type.iter().any(|&t| t != 0) {
            return Err(invalid("categorical splits are not supported".to_string()));
        }

        let child = |node: usize, raw: i32| -> Result<usize, ModelLoadError> {
            // Children always come after their parent.
            match usize::try_from(raw) {
                Ok(c) if c > node && c < n => Ok(c),
                _ => Err(invalid(format!("node {node} has invalid child {raw}"))),
            }
        };

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            // `base_weights` is not scaled by eta on pruned leaves.
            if doc.left_children[i] == -1 {
                nodes.push(Node::Leaf(doc.split_conditions[i]));
                continue;
            }
            let feature = usize::try_from(doc.split_indices[i])
                .ok()
                .filter(|&f| f < num_feature)
                .ok_or_else(|| {
                    invalid(format!(
                        "node {i} splits on feature {} of {num_feature}",
                        doc.split_indices[i]
                    ))
                })?;
            nodes.push(Node::Split {
                feature,
                threshold: doc.split_conditions[i],
                left: child(i, doc.left_children[i])?,
                right: child(i, doc.right_children[i])?,
            });
        }

        Ok(Self { nodes })
    }

    fn leaf_value(&self, row: &[f32]) -> f32 {
        let mut i = 0;
        loop {
            match self.nodes[i] {
                Node::Leaf(value) => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if row[feature] < threshold { left } else { right };
                }
            }
        }
    }
}

/// XGBoost `binary:logistic` tree ensemble.
#[derive(Debug, Clone)]
pub struct XgbClassifier {
    trees: Vec<Tree>,
    base_margin: f32,
    num_feature: usize,
    feature_names: Option<Vec<String>>,
}

impl XgbClassifier {
    /// Load a model saved with `Booster.save_model("*.json")`.
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        let text = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let model = Self::from_json_str(&text)?;
        info!(
            model = %path.display(),
            trees = model.trees.len(),
            features = model.num_feature,
            "loaded XGBoost model"
        );
        Ok(model)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ModelLoadError> {
        let doc: ModelDoc = serde_json::from_str(text)?;
        let learner = doc.learner;

        if learner.objective.name != "binary:logistic" {
            return Err(ModelLoadError::UnsupportedObjective(learner.objective.name));
        }
        let booster = learner.gradient_booster;
        let trees_doc = match (booster.name.as_str(), booster.model) {
            ("gbtree", Some(model)) => model,
            _ => return Err(ModelLoadError::UnsupportedBooster(booster.name)),
        };

        let params = learner.learner_model_param;
        let num_feature = params
            .num_feature
            .trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| ModelLoadError::InvalidParam {
                name: "num_feature",
                value: params.num_feature.clone(),
            })?;
        let base_score = parse_base_score(&params.base_score).ok_or_else(|| {
            ModelLoadError::InvalidParam {
                name: "base_score",
                value: params.base_score.clone(),
            }
        })?;

        let trees = trees_doc
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, t)| Tree::from_doc(i, t, num_feature))
            .collect::<Result<Vec<_>, _>>()?;

        let feature_names = if learner.feature_names.is_empty() {
            None
        } else if learner.feature_names.len() != num_feature {
            return Err(ModelLoadError::InvalidParam {
                name: "feature_names",
                value: learner.feature_names.join(","),
            });
        } else {
            Some(learner.feature_names)
        };

        Ok(Self {
            trees,
            base_margin: logit(base_score),
            num_feature,
            feature_names,
        })
    }

    pub fn num_feature(&self) -> usize {
        self.num_feature
    }

    pub fn num_trees(&self) -> usize {
        self.trees.len()
    }

    /// Raw margin (log-odds of the positive class) for one row.
    fn margin(&self, row: &[Code]) -> anyhow::Result<f32> {
        anyhow::ensure!(
            row.len() == self.num_feature,
            "model expects {} features, got {}",
            self.num_feature,
            row.len()
        );
        // XGBoost evaluates splits in f32.
        let values: Vec<f32> = row.iter().map(|&c| c as f32).collect();
        Ok(self
            .trees
            .iter()
            .fold(self.base_margin, |acc, t| acc + t.leaf_value(&values)))
    }
}

impl Classifier for XgbClassifier {
    fn predict(&self, row: &[Code]) -> anyhow::Result<i64> {
        Ok(self.classify(row)?.0)
    }

    fn predict_proba(&self, row: &[Code]) -> anyhow::Result<[f64; 2]> {
        let p1 = sigmoid(f64::from(self.margin(row)?));
        Ok([1.0 - p1, p1])
    }

    fn classify(&self, row: &[Code]) -> anyhow::Result<(i64, [f64; 2])> {
        let proba = self.predict_proba(row)?;
        Ok((i64::from(proba[1] > 0.5), proba))
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}

/// Accepts `"5E-1"` as well as the bracketed `"[5E-1]"` newer releases write.
fn parse_base_score(raw: &str) -> Option<f32> {
    let t = raw.trim();
    let t = t
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(t);
    t.trim()
        .parse::<f32>()
        .ok()
        .filter(|p| *p > 0.0 && *p < 1.0)
}

fn logit(p: f32) -> f32 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
