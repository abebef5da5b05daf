//! Model artifact loader

use super::booster::Booster;
use super::inference::Model;
use super::onnx::{OnnxFormat, OnnxModel};
use crate::artifacts::{load_artifact, ArtifactFormat};
use crate::error::Result;
use std::path::Path;
use tracing::info;

/// A decoded model artifact before its prediction interface is resolved
#[derive(Debug)]
pub enum LoadedModel {
    Onnx(OnnxModel),
    Booster(Booster),
}

impl From<OnnxModel> for LoadedModel {
    fn from(model: OnnxModel) -> Self {
        LoadedModel::Onnx(model)
    }
}

/// Decodes XGBoost JSON model dumps
#[derive(Debug, Clone, Copy, Default)]
pub struct XgboostJsonFormat;

impl ArtifactFormat<LoadedModel> for XgboostJsonFormat {
    fn name(&self) -> &'static str {
        "xgboost-json"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> anyhow::Result<LoadedModel> {
        Booster::from_json_slice(bytes).map(LoadedModel::Booster)
    }
}

/// Loader for model artifacts
#[derive(Debug, Default)]
pub struct ModelLoader;

impl ModelLoader {
    pub fn new() -> Self {
        Self
    }

    /// Load a model, trying ONNX first and XGBoost JSON second
    pub fn load_model<P: AsRef<Path>>(&self, path: P) -> Result<Model> {
        let path = path.as_ref();
        let formats: [&dyn ArtifactFormat<LoadedModel>; 2] = [&OnnxFormat, &XgboostJsonFormat];

        let loaded = load_artifact(path, &formats)?;
        let model = Model::from_loaded(loaded)?;

        info!(path = %path.display(), model = model.kind(), "Model loaded successfully");
        Ok(model)
    }
}
