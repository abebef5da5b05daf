//! Gradient-boosted tree predictor loaded from XGBoost JSON models.
//!
//! Only the parts of the XGBoost >= 1.0 JSON layout needed for inference are parsed.
//! These are "foreign types"; they are converted into a compact [`Booster`] with
//! validated node links right after parsing.
//!
//! Prediction requires wrapping the input into a [`DMatrix`], mirroring the way the
//! native library is driven. Binary objectives yield one probability per row;
//! multiclass objectives yield one probability per class.

use super::transform::{logit, OutputTransform};
use anyhow::{anyhow, bail, ensure, Result};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use serde_with::{serde_as, DisplayFromStr};

// =============================================================================
// Custom deserializers for XGBoost-specific encodings
// =============================================================================

/// `base_score` appears as a number, a string ("5E-1") or a bracketed string ("[5E-1]").
fn deserialize_base_score<'de, D>(deserializer: D) -> std::result::Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let value = JsonValue::deserialize(deserializer)?;
    let mut cur = value;
    loop {
        match cur {
            JsonValue::Number(n) => {
                return n
                    .as_f64()
                    .map(|f| f as f32)
                    .ok_or_else(|| SerdeError::custom("invalid number"));
            }
            JsonValue::String(s) => {
                let t = s.trim();
                let inner = t
                    .strip_prefix('[')
                    .and_then(|r| r.strip_suffix(']'))
                    .unwrap_or(t);
                return inner.trim().parse::<f32>().map_err(|_| {
                    SerdeError::custom(format!("cannot parse base_score from string: {}", s))
                });
            }
            JsonValue::Array(arr) => {
                cur = arr
                    .into_iter()
                    .next()
                    .ok_or_else(|| SerdeError::custom("empty base_score array"))?;
            }
            _ => {
                return Err(SerdeError::custom(
                    "base_score must be number, string, or array",
                ))
            }
        }
    }
}

/// `default_left` is stored as 0/1 integers by most versions and as booleans by some.
fn deserialize_flags<'de, D>(deserializer: D) -> std::result::Result<Vec<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    Vec::<JsonValue>::deserialize(deserializer)?
        .into_iter()
        .map(|v| match v {
            JsonValue::Bool(b) => Ok(b),
            JsonValue::Number(n) => Ok(n.as_f64().map(|f| f != 0.0).unwrap_or(false)),
            other => Err(SerdeError::custom(format!("invalid flag value {}", other))),
        })
        .collect()
}

// =============================================================================
// Foreign (JSON) types
// =============================================================================

#[derive(Debug, Deserialize)]
struct XgbDocument {
    learner: XgbLearner,
}

#[derive(Debug, Deserialize)]
struct XgbLearner {
    learner_model_param: LearnerModelParam,
    objective: ObjectiveDef,
    gradient_booster: GradientBoosterDef,
    #[serde(default)]
    feature_names: Vec<String>,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct LearnerModelParam {
    #[serde(deserialize_with = "deserialize_base_score")]
    base_score: f32,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    num_class: i64,
    #[serde_as(as = "DisplayFromStr")]
    #[serde(default)]
    num_feature: i64,
}

#[derive(Debug, Deserialize)]
struct ObjectiveDef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TreeModelDef {
    trees: Vec<TreeDef>,
    tree_info: Vec<i32>,
}

#[derive(Debug, Deserialize)]
struct DartInner {
    model: TreeModelDef,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
enum GradientBoosterDef {
    Gbtree { model: TreeModelDef },
    Dart { gbtree: DartInner, weight_drop: Vec<f32> },
    Gblinear {},
}

#[derive(Debug, Deserialize)]
struct TreeDef {
    left_children: Vec<i32>,
    right_children: Vec<i32>,
    split_indices: Vec<i64>,
    split_conditions: Vec<f32>,
    #[serde(deserialize_with = "deserialize_flags")]
    default_left: Vec<bool>,
    #[serde(default)]
    split_type: Vec<i32>,
}

// =============================================================================
// Native representation
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Split {
        feature: usize,
        threshold: f32,
        left: usize,
        right: usize,
        default_left: bool,
    },
    Leaf(f32),
}

#[derive(Debug, Clone, PartialEq)]
struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn from_def(def: TreeDef, n_features: usize) -> Result<Self> {
        let n = def.left_children.len();
        ensure!(n > 0, "tree has no nodes");
        ensure!(
            def.right_children.len() == n
                && def.split_indices.len() == n
                && def.split_conditions.len() == n
                && def.default_left.len() == n,
            "tree node arrays have inconsistent lengths"
        );
        if def.split_type.iter().any(|&t| t != 0) {
            bail!("categorical splits are not supported");
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (left, right) = (def.left_children[i], def.right_children[i]);
            if left == -1 {
                nodes.push(Node::Leaf(def.split_conditions[i]));
                continue;
            }

            // Children always follow their parent, which also rules out cycles
            let child = |c: i32| -> Result<usize> {
                let c = usize::try_from(c).map_err(|_| anyhow!("node {} has invalid child {}", i, c))?;
                ensure!(c > i && c < n, "node {} has out-of-range child {}", i, c);
                Ok(c)
            };
            let feature = usize::try_from(def.split_indices[i])
                .map_err(|_| anyhow!("node {} has negative split index", i))?;
            if n_features > 0 {
                ensure!(
                    feature < n_features,
                    "node {} splits on feature {} but the model has {} features",
                    i,
                    feature,
                    n_features
                );
            }

            nodes.push(Node::Split {
                feature,
                threshold: def.split_conditions[i],
                left: child(left)?,
                right: child(right)?,
                default_left: def.default_left[i],
            });
        }

        Ok(Self { nodes })
    }

    #[inline]
    fn predict_row(&self, row: &[f32]) -> f32 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf(value) => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                } => {
                    let x = row.get(*feature).copied().unwrap_or(f32::NAN);
                    idx = if x.is_nan() {
                        if *default_left {
                            *left
                        } else {
                            *right
                        }
                    } else if x < *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

/// Dense input matrix in the layout the booster consumes. NaN marks a missing value.
#[derive(Debug, Clone, PartialEq)]
pub struct DMatrix {
    data: Array2<f32>,
}

impl DMatrix {
    /// Wrap a `[rows, features]` matrix (copied into standard row-major layout)
    pub fn from_array(x: ArrayView2<'_, f32>) -> Self {
        Self {
            data: x.as_standard_layout().into_owned(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.data.ncols()
    }
}

/// Raw booster output, shaped like the native library's `predict`
#[derive(Debug, Clone, PartialEq)]
pub enum RawPrediction {
    /// One value per row (binary objectives)
    OneDim(Array1<f32>),
    /// `[rows, classes]` (multiclass objectives)
    TwoDim(Array2<f32>),
}

/// A gradient-boosted tree ensemble
#[derive(Debug, Clone, PartialEq)]
pub struct Booster {
    trees: Vec<Tree>,
    tree_groups: Vec<usize>,
    tree_weights: Vec<f32>,
    n_groups: usize,
    n_features: usize,
    base_score: f32,
    objective: String,
    feature_names: Vec<String>,
}

impl Booster {
    /// Parse an XGBoost JSON model
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let doc: XgbDocument = serde_json::from_slice(bytes)?;
        let learner = doc.learner;

        let (model, weights) = match learner.gradient_booster {
            GradientBoosterDef::Gbtree { model } => {
                let n = model.trees.len();
                (model, vec![1.0; n])
            }
            GradientBoosterDef::Dart {
                gbtree,
                weight_drop,
            } => {
                ensure!(
                    weight_drop.len() == gbtree.model.trees.len(),
                    "dart weight_drop has {} entries for {} trees",
                    weight_drop.len(),
                    gbtree.model.trees.len()
                );
                (gbtree.model, weight_drop)
            }
            GradientBoosterDef::Gblinear {} => bail!("gblinear boosters are not supported"),
        };

        ensure!(
            model.tree_info.len() == model.trees.len(),
            "tree_info has {} entries for {} trees",
            model.tree_info.len(),
            model.trees.len()
        );

        let n_groups = learner.learner_model_param.num_class.max(1) as usize;
        let n_features = learner.learner_model_param.num_feature.max(0) as usize;

        let tree_groups = model
            .tree_info
            .iter()
            .map(|&g| {
                let g = usize::try_from(g).map_err(|_| anyhow!("negative tree group {}", g))?;
                ensure!(g < n_groups, "tree group {} exceeds {} classes", g, n_groups);
                Ok(g)
            })
            .collect::<Result<Vec<_>>>()?;

        let trees = model
            .trees
            .into_iter()
            .enumerate()
            .map(|(i, def)| {
                Tree::from_def(def, n_features).map_err(|e| anyhow!("tree {}: {}", i, e))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trees,
            tree_groups,
            tree_weights: weights,
            n_groups,
            n_features,
            base_score: learner.learner_model_param.base_score,
            objective: learner.objective.name,
            feature_names: learner.feature_names,
        })
    }

    /// Objective name as stored in the model
    pub fn objective(&self) -> &str {
        &self.objective
    }

    /// Probability transform for classification objectives; `None` otherwise
    pub fn output_transform(&self) -> Option<OutputTransform> {
        match self.objective.as_str() {
            "binary:logistic" | "reg:logistic" => Some(OutputTransform::Sigmoid),
            "multi:softprob" | "multi:softmax" => Some(OutputTransform::Softmax),
            _ => None,
        }
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn base_margin(&self) -> f32 {
        match self.output_transform() {
            Some(OutputTransform::Sigmoid) => logit(self.base_score),
            _ => self.base_score,
        }
    }

    /// Raw margins, row-major `(rows, groups)`
    pub fn predict_margin(&self, dmat: &DMatrix) -> Result<Array2<f32>> {
        if self.n_features > 0 {
            ensure!(
                dmat.n_cols() == self.n_features,
                "feature shape mismatch, expected: {}, got {}",
                self.n_features,
                dmat.n_cols()
            );
        }

        let mut margins = Array2::from_elem((dmat.n_rows(), self.n_groups), self.base_margin());
        for (mut out, row) in margins
            .axis_iter_mut(Axis(0))
            .zip(dmat.data.axis_iter(Axis(0)))
        {
            let row = row
                .as_slice()
                .ok_or_else(|| anyhow!("input row is not contiguous"))?;
            for ((tree, &group), &weight) in self
                .trees
                .iter()
                .zip(&self.tree_groups)
                .zip(&self.tree_weights)
            {
                out[group] += weight * tree.predict_row(row);
            }
        }
        Ok(margins)
    }

    /// Predict probabilities. Single-group models return one value per row.
    pub fn predict(&self, dmat: &DMatrix) -> Result<RawPrediction> {
        let transform = self
            .output_transform()
            .ok_or_else(|| anyhow!("objective '{}' does not produce probabilities", self.objective))?;

        let mut margins = self.predict_margin(dmat)?;
        let n_groups = self.n_groups;
        let buf = margins
            .as_slice_mut()
            .ok_or_else(|| anyhow!("margin buffer is not contiguous"))?;
        transform.transform_inplace(buf, n_groups);

        if n_groups == 1 {
            Ok(RawPrediction::OneDim(margins.column(0).to_owned()))
        } else {
            Ok(RawPrediction::TwoDim(margins))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    /// Two stumps on feature 0 (threshold 0.5) for a binary:logistic model
    pub(crate) const BINARY_MODEL: &str = r#"{
        "learner": {
            "attributes": {},
            "feature_names": ["x0", "x1"],
            "learner_model_param": {"base_score": "5E-1", "num_class": "0", "num_feature": "2"},
            "objective": {"name": "binary:logistic", "reg_loss_param": {"scale_pos_weight": "1"}},
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "gbtree_model_param": {"num_trees": "2", "num_parallel_tree": "1"},
                    "tree_info": [0, 0],
                    "trees": [
                        {
                            "id": 0,
                            "tree_param": {"num_nodes": "3"},
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [0, 0, 0],
                            "split_conditions": [0.5, -1.0, 1.0],
                            "default_left": [1, 0, 0],
                            "split_type": [0, 0, 0]
                        },
                        {
                            "id": 1,
                            "tree_param": {"num_nodes": "3"},
                            "left_children": [1, -1, -1],
                            "right_children": [2, -1, -1],
                            "split_indices": [1, 0, 0],
                            "split_conditions": [10.0, -0.5, 0.5],
                            "default_left": [0, 0, 0]
                        }
                    ]
                }
            }
        },
        "version": [2, 0, 3]
    }"#;

    /// Three-class softprob model, one stump per class on feature 0
    pub(crate) const MULTICLASS_MODEL: &str = r#"{
        "learner": {
            "learner_model_param": {"base_score": "[5E-1]", "num_class": "3", "num_feature": "1"},
            "objective": {"name": "multi:softprob"},
            "gradient_booster": {
                "name": "gbtree",
                "model": {
                    "tree_info": [0, 1, 2],
                    "trees": [
                        {"left_children": [1, -1, -1], "right_children": [2, -1, -1],
                         "split_indices": [0, 0, 0], "split_conditions": [1.0, 2.0, -2.0],
                         "default_left": [true, false, false]},
                        {"left_children": [-1], "right_children": [-1],
                         "split_indices": [0], "split_conditions": [0.0],
                         "default_left": [false]},
                        {"left_children": [1, -1, -1], "right_children": [2, -1, -1],
                         "split_indices": [0, 0, 0], "split_conditions": [1.0, -2.0, 2.0],
                         "default_left": [true, false, false]}
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_binary_model() {
        let booster = Booster::from_json_slice(BINARY_MODEL.as_bytes()).unwrap();
        assert_eq!(booster.n_trees(), 2);
        assert_eq!(booster.n_groups(), 1);
        assert_eq!(booster.n_features(), 2);
        assert_eq!(booster.objective(), "binary:logistic");
        assert_eq!(booster.feature_names(), &["x0", "x1"]);
        assert_eq!(booster.output_transform(), Some(OutputTransform::Sigmoid));
    }

    #[test]
    fn test_binary_margins_and_probabilities() {
        let booster = Booster::from_json_slice(BINARY_MODEL.as_bytes()).unwrap();
        let x = array![[0.0f32, 0.0], [1.0, 20.0], [f32::NAN, 20.0]];
        let dmat = DMatrix::from_array(x.view());

        // base_score 0.5 is margin 0.0
        let margins = booster.predict_margin(&dmat).unwrap();
        assert_abs_diff_eq!(margins[[0, 0]], -1.5, epsilon = 1e-6);
        assert_abs_diff_eq!(margins[[1, 0]], 1.5, epsilon = 1e-6);
        // missing feature 0 follows default_left
        assert_abs_diff_eq!(margins[[2, 0]], -0.5, epsilon = 1e-6);

        match booster.predict(&dmat).unwrap() {
            RawPrediction::OneDim(p) => {
                assert_eq!(p.len(), 3);
                assert_abs_diff_eq!(p[0], 1.0 / (1.0 + 1.5f32.exp()), epsilon = 1e-6);
                assert!(p.iter().all(|&v| (0.0..=1.0).contains(&v)));
            }
            other => panic!("expected one-dimensional output, got {:?}", other),
        }
    }

    #[test]
    fn test_multiclass_probabilities() {
        let booster = Booster::from_json_slice(MULTICLASS_MODEL.as_bytes()).unwrap();
        let dmat = DMatrix::from_array(array![[0.0f32], [5.0]].view());

        match booster.predict(&dmat).unwrap() {
            RawPrediction::TwoDim(p) => {
                assert_eq!(p.shape(), &[2, 3]);
                for row in p.rows() {
                    assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-5);
                }
                assert!(p[[0, 0]] > p[[0, 2]]);
                assert!(p[[1, 2]] > p[[1, 0]]);
            }
            other => panic!("expected two-dimensional output, got {:?}", other),
        }
    }

    #[test]
    fn test_feature_count_mismatch() {
        let booster = Booster::from_json_slice(BINARY_MODEL.as_bytes()).unwrap();
        let dmat = DMatrix::from_array(array![[0.0f32, 1.0, 2.0]].view());
        let err = booster.predict(&dmat).unwrap_err();
        assert!(err.to_string().contains("feature shape mismatch"));
    }

    #[test]
    fn test_regression_objective_has_no_probabilities() {
        let json = BINARY_MODEL.replace("binary:logistic", "reg:squarederror");
        let booster = Booster::from_json_slice(json.as_bytes()).unwrap();
        assert_eq!(booster.output_transform(), None);
    }

    #[test]
    fn test_backward_child_link_rejected() {
        let json = BINARY_MODEL.replacen("\"left_children\": [1, -1, -1]", "\"left_children\": [0, -1, -1]", 1);
        let err = Booster::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("out-of-range child"));
    }

    #[test]
    fn test_gblinear_rejected() {
        let json = r#"{"learner": {
            "learner_model_param": {"base_score": "0.5", "num_class": "0", "num_feature": "1"},
            "objective": {"name": "binary:logistic"},
            "gradient_booster": {"name": "gblinear", "model": {"weights": [0.1, 0.2]}}
        }}"#;
        let err = Booster::from_json_slice(json.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("gblinear"));
    }
}
