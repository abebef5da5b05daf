//! Inference over the supported model shapes

use super::booster::{Booster, DMatrix, RawPrediction};
use super::loader::LoadedModel;
use super::onnx::OnnxClassifier;
use crate::error::{PredictError, Result};
use crate::types::{Label, Predictions};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use std::fmt;
use tracing::debug;

/// Anything that maps a feature matrix to one label per row
pub trait Classifier {
    fn predict(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Vec<Label>>;
}

/// A classifier that also reports `[rows, classes]` probabilities
pub trait ProbabilisticClassifier: Classifier {
    fn predict_proba(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>>;

    /// Labels and probabilities together; implementors that can do both in one pass override this.
    fn predict_with_proba(
        &mut self,
        x: ArrayView2<'_, f32>,
    ) -> anyhow::Result<(Vec<Label>, Array2<f32>)> {
        let proba = self.predict_proba(x)?;
        let labels = self.predict(x)?;
        Ok((labels, proba))
    }
}

/// A model whose prediction interface was resolved at load time
pub enum Model {
    /// Labels plus class probabilities
    Probabilistic(Box<dyn ProbabilisticClassifier>),
    /// Labels only
    LabelOnly(Box<dyn Classifier>),
    /// Gradient-boosted trees fed through a `DMatrix`
    RawBooster(Booster),
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Model::{}", self.kind())
    }
}

impl Model {
    /// Pick the prediction interface of a freshly decoded artifact
    pub fn from_loaded(loaded: LoadedModel) -> Result<Self> {
        match loaded {
            LoadedModel::Onnx(model) => match OnnxClassifier::detect(model) {
                Ok(classifier) if classifier.has_probabilities() => {
                    Ok(Model::Probabilistic(Box::new(classifier)))
                }
                Ok(classifier) => Ok(Model::LabelOnly(Box::new(classifier))),
                Err(model) => Err(PredictError::UnsupportedModel {
                    reason: format!(
                        "ONNX graph has no label or probability output (outputs: {:?})",
                        model.output_names()
                    ),
                }),
            },
            LoadedModel::Booster(booster) => {
                if booster.output_transform().is_none() {
                    return Err(PredictError::UnsupportedModel {
                        reason: format!(
                            "booster objective '{}' does not produce class probabilities",
                            booster.objective()
                        ),
                    });
                }
                Ok(Model::RawBooster(booster))
            }
        }
    }

    /// Variant name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Probabilistic(_) => "probabilistic",
            Model::LabelOnly(_) => "label_only",
            Model::RawBooster(_) => "raw_booster",
        }
    }

    /// Predict labels and, when the model provides them, class probabilities
    pub fn predict(&mut self, x: ArrayView2<'_, f32>) -> Result<Predictions> {
        let n_rows = x.nrows();

        let (labels, probabilities) = match self {
            Model::Probabilistic(model) => {
                let (labels, proba) = model.predict_with_proba(x).map_err(inference_error)?;
                (labels, Some(proba))
            }
            Model::LabelOnly(model) => (model.predict(x).map_err(inference_error)?, None),
            Model::RawBooster(booster) => {
                let dmat = DMatrix::from_array(x);
                let proba = match booster.predict(&dmat).map_err(inference_error)? {
                    RawPrediction::OneDim(p) => expand_binary(p.view()),
                    RawPrediction::TwoDim(p) => p,
                };
                (argmax_rows(proba.view()), Some(proba))
            }
        };

        check_rows("labels", labels.len(), n_rows)?;
        if let Some(proba) = &probabilities {
            check_rows("probabilities", proba.nrows(), n_rows)?;
        }

        debug!(
            model = self.kind(),
            rows = n_rows,
            classes = probabilities.as_ref().map(|p| p.ncols()),
            "Inference complete"
        );
        Ok(Predictions {
            labels,
            probabilities,
        })
    }
}

fn inference_error(e: anyhow::Error) -> PredictError {
    PredictError::Inference(format!("{:#}", e))
}

fn check_rows(what: &str, actual: usize, expected: usize) -> Result<()> {
    if actual != expected {
        return Err(PredictError::Inference(format!(
            "model returned {} {} for {} input rows",
            actual, what, expected
        )));
    }
    Ok(())
}

/// `[1 - p, p]` for each positive-class probability
pub fn expand_binary(p: ArrayView1<'_, f32>) -> Array2<f32> {
    let mut out = Array2::zeros((p.len(), 2));
    for (mut row, &pos) in out.axis_iter_mut(Axis(0)).zip(p.iter()) {
        row[0] = 1.0 - pos;
        row[1] = pos;
    }
    out
}

/// Index of the largest probability per row; ties go to the lowest index
pub fn argmax_rows(proba: ArrayView2<'_, f32>) -> Vec<Label> {
    proba
        .rows()
        .into_iter()
        .map(|row| {
            let mut best = 0;
            for (i, &v) in row.iter().enumerate() {
                if v > row[best] {
                    best = i;
                }
            }
            Label::from(best)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::booster::tests::{BINARY_MODEL, MULTICLASS_MODEL};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    struct FixedProba(Array2<f32>);

    impl Classifier for FixedProba {
        fn predict(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Vec<Label>> {
            Ok(argmax_rows(self.0.slice(ndarray::s![..x.nrows(), ..])))
        }
    }

    impl ProbabilisticClassifier for FixedProba {
        fn predict_proba(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>> {
            Ok(self.0.slice(ndarray::s![..x.nrows(), ..]).to_owned())
        }
    }

    /// Labels every row with the same text class
    struct Constant(&'static str);

    impl Classifier for Constant {
        fn predict(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Vec<Label>> {
            Ok(vec![Label::Text(self.0.to_string()); x.nrows()])
        }
    }

    /// Returns one label regardless of input size
    struct Short;

    impl Classifier for Short {
        fn predict(&mut self, _x: ArrayView2<'_, f32>) -> anyhow::Result<Vec<Label>> {
            Ok(vec![Label::Int(0)])
        }
    }

    fn booster_model(json: &str) -> Model {
        let booster = Booster::from_json_slice(json.as_bytes()).unwrap();
        Model::from_loaded(LoadedModel::Booster(booster)).unwrap()
    }

    #[test]
    fn test_probabilistic_model_returns_both() {
        let proba = array![[0.7f32, 0.2, 0.1], [0.1, 0.1, 0.8]];
        let mut model = Model::Probabilistic(Box::new(FixedProba(proba.clone())));

        let preds = model.predict(Array2::zeros((2, 4)).view()).unwrap();

        assert_eq!(preds.labels, vec![Label::Int(0), Label::Int(2)]);
        assert_eq!(preds.probabilities, Some(proba));
    }

    #[test]
    fn test_probability_rows_sum_to_one() {
        let mut model = booster_model(MULTICLASS_MODEL);
        let preds = model
            .predict(array![[0.0f32], [2.0], [f32::NAN]].view())
            .unwrap();

        let proba = preds.probabilities.unwrap();
        assert_eq!(proba.shape(), &[3, 3]);
        for row in proba.rows() {
            assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_label_only_model_has_no_probabilities() {
        let mut model = Model::LabelOnly(Box::new(Constant("fraud")));
        let preds = model.predict(Array2::zeros((3, 2)).view()).unwrap();

        assert_eq!(preds.n_rows(), 3);
        assert_eq!(preds.labels[2], Label::Text("fraud".to_string()));
        assert!(preds.probabilities.is_none());
    }

    #[test]
    fn test_binary_booster_expands_to_two_columns() {
        let mut model = booster_model(BINARY_MODEL);
        assert_eq!(model.kind(), "raw_booster");

        let preds = model
            .predict(array![[0.0f32, 0.0], [1.0, 20.0]].view())
            .unwrap();
        let proba = preds.probabilities.unwrap();

        assert_eq!(proba.shape(), &[2, 2]);
        for row in proba.rows() {
            assert_abs_diff_eq!(row[0], 1.0 - row[1], epsilon = 1e-6);
        }
        assert_eq!(preds.labels, vec![Label::Int(0), Label::Int(1)]);
    }

    #[test]
    fn test_expand_binary() {
        let expanded = expand_binary(array![0.8f32].view());
        assert_eq!(expanded.shape(), &[1, 2]);
        assert_abs_diff_eq!(expanded[[0, 0]], 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(expanded[[0, 1]], 0.8, epsilon = 1e-6);
        assert_eq!(argmax_rows(expanded.view()), vec![Label::Int(1)]);
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax_rows(array![[0.5f32, 0.5]].view()), vec![Label::Int(0)]);
    }

    #[test]
    fn test_regression_booster_unsupported() {
        let json = BINARY_MODEL.replace("binary:logistic", "reg:squarederror");
        let booster = Booster::from_json_slice(json.as_bytes()).unwrap();
        let err = Model::from_loaded(LoadedModel::Booster(booster)).unwrap_err();

        assert!(matches!(err, PredictError::UnsupportedModel { .. }));
        assert!(err.to_string().contains("reg:squarederror"));
    }

    #[test]
    fn test_row_count_mismatch_rejected() {
        let mut model = Model::LabelOnly(Box::new(Short));
        let err = model.predict(Array2::zeros((3, 1)).view()).unwrap_err();
        assert!(matches!(err, PredictError::Inference(_)));
    }

    #[test]
    fn test_booster_feature_mismatch_is_inference_error() {
        let mut model = booster_model(BINARY_MODEL);
        let err = model.predict(Array2::zeros((1, 5)).view()).unwrap_err();
        assert!(err.to_string().contains("feature shape mismatch"));
    }
}
