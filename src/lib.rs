//! Tabular Prediction Library
//!
//! Batch inference for trained tabular classifiers: load a model with its feature
//! schema, align delimited input to it, preprocess, predict, and lay out the results.

pub mod aligner;
pub mod artifacts;
pub mod assembler;
pub mod config;
pub mod error;
pub mod input;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocess;
pub mod types;

pub use aligner::InputAligner;
pub use assembler::ResultTable;
pub use config::AppConfig;
pub use error::{PredictError, Result, ValidationError};
pub use models::Model;
pub use pipeline::{run_predictions, RunOptions, RunOutput};
pub use types::{Label, Predictions, Table};
