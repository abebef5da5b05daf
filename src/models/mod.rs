//! Model loading and inference components

pub mod booster;
pub mod inference;
pub mod loader;
pub mod onnx;
pub mod transform;

pub use booster::{Booster, DMatrix};
pub use inference::{argmax_rows, expand_binary, Classifier, Model, ProbabilisticClassifier};
pub use loader::{LoadedModel, ModelLoader};
pub use onnx::{OnnxFormat, OnnxModel};
