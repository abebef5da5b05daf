//! ONNX Runtime sessions for exported classifiers and preprocessors

use crate::artifacts::ArtifactFormat;
use crate::types::Label;
use anyhow::{anyhow, bail, ensure, Context, Result};
use ndarray::{Array2, ArrayView2};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue, SessionOutputs};
use ort::tensor::TensorElementType;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use tracing::debug;

/// Graph inputs bound by name for one run
pub type NamedInputs = Vec<(String, SessionInputValue<'static>)>;

/// A loaded ONNX graph with its input and output names
pub struct OnnxModel {
    session: Session,
    input_names: Vec<String>,
    /// Element type per input; `None` for non-tensor inputs
    input_types: Vec<Option<TensorElementType>>,
    output_names: Vec<String>,
}

impl std::fmt::Debug for OnnxModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxModel")
            .field("inputs", &self.input_names)
            .field("outputs", &self.output_names)
            .finish()
    }
}

impl OnnxModel {
    /// Build a session from serialized graph bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(1)?
            .commit_from_memory(bytes)
            .context("Failed to build ONNX session")?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let input_types = session
            .inputs
            .iter()
            .map(|i| i.input_type.tensor_type())
            .collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();
        ensure!(!input_names.is_empty(), "graph declares no inputs");

        debug!(inputs = ?input_names, outputs = ?output_names, "ONNX session ready");
        Ok(Self {
            session,
            input_names,
            input_types,
            output_names,
        })
    }

    pub fn input_names(&self) -> &[String] {
        &self.input_names
    }

    /// Element type of the input at `index`
    pub fn input_type(&self, index: usize) -> Option<TensorElementType> {
        self.input_types.get(index).copied().flatten()
    }

    pub fn output_names(&self) -> &[String] {
        &self.output_names
    }

    /// First output whose name contains `pattern`
    pub fn find_output(&self, pattern: &str) -> Option<&str> {
        self.output_names
            .iter()
            .find(|name| name.contains(pattern))
            .map(String::as_str)
    }

    /// Run the graph and hand the outputs to `extract` before they are released
    pub fn run_with<T>(
        &mut self,
        inputs: NamedInputs,
        extract: impl FnOnce(&SessionOutputs) -> Result<T>,
    ) -> Result<T> {
        let outputs = self.session.run(inputs)?;
        extract(&outputs)
    }

    /// Bind the whole matrix to the graph's single input
    pub fn matrix_inputs(&self, x: ArrayView2<'_, f32>) -> Result<NamedInputs> {
        ensure!(
            self.input_names.len() == 1,
            "graph expects {} inputs, a single matrix cannot be bound",
            self.input_names.len()
        );
        Ok(vec![(self.input_names[0].clone(), matrix_tensor(x)?)])
    }
}

/// `[rows, cols]` f32 tensor from a matrix view
pub fn matrix_tensor(x: ArrayView2<'_, f32>) -> Result<SessionInputValue<'static>> {
    let shape = vec![x.nrows() as i64, x.ncols() as i64];
    let tensor = Tensor::from_array((shape, x.iter().copied().collect::<Vec<f32>>()))
        .context("Failed to create input tensor")?;
    Ok(tensor.into())
}

/// Read an f32 output as a `[rows, cols]` matrix; a 1-D output becomes one column
pub fn extract_matrix(value: &DynValue) -> Result<Array2<f32>> {
    let (shape, data) = value.try_extract_tensor::<f32>()?;
    let dims: Vec<i64> = shape.iter().copied().collect();
    let (rows, cols) = match dims.as_slice() {
        [rows, cols] => (*rows as usize, *cols as usize),
        [rows] => (*rows as usize, 1),
        other => bail!("expected a 2-D tensor, got shape {:?}", other),
    };
    Ok(Array2::from_shape_vec((rows, cols), data.to_vec())?)
}

/// Read a label tensor; int64 classes become `Int`, string classes `Text`
pub fn extract_labels(value: &DynValue) -> Result<Vec<Label>> {
    if let Ok((_, data)) = value.try_extract_tensor::<i64>() {
        return Ok(data.iter().map(|&v| Label::Int(v)).collect());
    }
    let (_, data) = value
        .try_extract_strings()
        .map_err(|e| anyhow!("label output is neither an int64 nor a string tensor: {}", e))?;
    Ok(data.into_iter().map(Label::Text).collect())
}

/// Class probabilities with the class each column stands for, when the graph names them
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    pub values: Array2<f32>,
    pub classes: Option<Vec<Label>>,
}

impl ClassProbabilities {
    /// Most probable class per row; the column index when classes are unnamed
    pub fn argmax_labels(&self) -> Vec<Label> {
        let labels = super::argmax_rows(self.values.view());
        match &self.classes {
            Some(classes) => labels
                .into_iter()
                .map(|label| match label {
                    Label::Int(i) => classes.get(i as usize).cloned().unwrap_or(Label::Int(i)),
                    other => other,
                })
                .collect(),
            None => labels,
        }
    }
}

/// Read class probabilities from either an f32 tensor or a ZipMap `seq(map(int64|string, float))`.
pub fn extract_probabilities(value: &DynValue) -> Result<ClassProbabilities> {
    if let Ok(values) = extract_matrix(value) {
        return Ok(ClassProbabilities {
            values,
            classes: None,
        });
    }

    let dtype = value.dtype();
    if DynSequenceValueType::can_downcast(&dtype) {
        return extract_from_sequence_map(value);
    }
    bail!("probability output is neither a float tensor nor a sequence of maps")
}

/// One map per row, keyed by class
fn extract_from_sequence_map(value: &DynValue) -> Result<ClassProbabilities> {
    let allocator = Allocator::default();

    let sequence = value
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;

    let mut classes: Option<Vec<Label>> = None;
    let mut data = Vec::new();
    for map_value in &maps {
        let mut kv_pairs: Vec<(Label, f32)> = match map_value.try_extract_key_values::<i64, f32>() {
            Ok(pairs) => pairs.into_iter().map(|(k, p)| (Label::Int(k), p)).collect(),
            Err(_) => map_value
                .try_extract_key_values::<String, f32>()?
                .into_iter()
                .map(|(k, p)| (Label::Text(k), p))
                .collect(),
        };
        kv_pairs.sort_by(|(a, _), (b, _)| a.cmp(b));

        let keys: Vec<Label> = kv_pairs.iter().map(|(k, _)| k.clone()).collect();
        match &classes {
            Some(expected) => ensure!(
                *expected == keys,
                "probability maps disagree on class ids: {:?} vs {:?}",
                expected,
                keys
            ),
            None => classes = Some(keys),
        }
        data.extend(kv_pairs.into_iter().map(|(_, p)| p));
    }

    let n_classes = classes.as_ref().map(Vec::len).unwrap_or(0);
    Ok(ClassProbabilities {
        values: Array2::from_shape_vec((maps.len(), n_classes), data)?,
        classes,
    })
}

/// Decodes ONNX graphs into any artifact that can be built from a session
#[derive(Debug, Clone, Copy, Default)]
pub struct OnnxFormat;

impl<T: From<OnnxModel>> ArtifactFormat<T> for OnnxFormat {
    fn name(&self) -> &'static str {
        "onnx"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> Result<T> {
        OnnxModel::from_bytes(bytes).map(T::from)
    }
}

/// An exported classifier graph.
///
/// Outputs named like `label` carry int64 or string labels and outputs named like
/// `prob` carry class probabilities; a graph with only probabilities gets argmax labels.
pub struct OnnxClassifier {
    model: OnnxModel,
    label_output: Option<String>,
    proba_output: Option<String>,
}

impl OnnxClassifier {
    /// Detect the classifier outputs; the graph is handed back when it has neither
    pub fn detect(model: OnnxModel) -> std::result::Result<Self, OnnxModel> {
        let label_output = model.find_output("label").map(str::to_string);
        let proba_output = model.find_output("prob").map(str::to_string);
        if label_output.is_none() && proba_output.is_none() {
            return Err(model);
        }
        Ok(Self {
            model,
            label_output,
            proba_output,
        })
    }

    pub fn has_probabilities(&self) -> bool {
        self.proba_output.is_some()
    }

    fn run(
        &mut self,
        x: ArrayView2<'_, f32>,
    ) -> Result<(Option<Vec<Label>>, Option<ClassProbabilities>)> {
        let inputs = self.model.matrix_inputs(x)?;
        let label_output = self.label_output.clone();
        let proba_output = self.proba_output.clone();

        self.model.run_with(inputs, |outputs| {
            let labels = match &label_output {
                Some(name) => Some(extract_labels(output(outputs, name)?)?),
                None => None,
            };
            let proba = match &proba_output {
                Some(name) => Some(extract_probabilities(output(outputs, name)?)?),
                None => None,
            };
            Ok((labels, proba))
        })
    }
}

fn output<'a>(outputs: &'a SessionOutputs, name: &str) -> Result<&'a DynValue> {
    outputs
        .get(name)
        .ok_or_else(|| anyhow!("graph produced no output named '{}'", name))
}

impl super::Classifier for OnnxClassifier {
    fn predict(&mut self, x: ArrayView2<'_, f32>) -> Result<Vec<Label>> {
        match self.run(x)? {
            (Some(labels), _) => Ok(labels),
            (None, Some(proba)) => Ok(proba.argmax_labels()),
            (None, None) => bail!("graph produced neither labels nor probabilities"),
        }
    }
}

impl super::ProbabilisticClassifier for OnnxClassifier {
    fn predict_proba(&mut self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        self.run(x)?
            .1
            .map(|proba| proba.values)
            .ok_or_else(|| anyhow!("graph has no probability output"))
    }

    fn predict_with_proba(&mut self, x: ArrayView2<'_, f32>) -> Result<(Vec<Label>, Array2<f32>)> {
        match self.run(x)? {
            (Some(labels), Some(proba)) => Ok((labels, proba.values)),
            (None, Some(proba)) => Ok((proba.argmax_labels(), proba.values)),
            (_, None) => bail!("graph has no probability output"),
        }
    }
}
