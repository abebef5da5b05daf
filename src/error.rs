//! Error types for the prediction pipeline

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using PredictError
pub type Result<T> = std::result::Result<T, PredictError>;

/// One format strategy that could not decode an artifact.
#[derive(Debug, Clone, PartialEq)]
pub struct FormatFailure {
    /// Format name, e.g. "onnx"
    pub format: &'static str,
    /// Rendered error chain from the decoder
    pub message: String,
}

impl fmt::Display for FormatFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.format, self.message)
    }
}

fn join_failures(failures: &[FormatFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// All failures the pipeline can surface
#[derive(Error, Debug)]
pub enum PredictError {
    // Artifact errors
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to load {} with any supported format ({})", path.display(), join_failures(failures))]
    Deserialize {
        path: PathBuf,
        failures: Vec<FormatFailure>,
    },

    #[error("Invalid metadata in {}: {details}", path.display())]
    Metadata { path: PathBuf, details: String },

    // Input errors
    #[error("Failed to parse input table {}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Line {line} of {} has {actual} fields, the header has {expected}", path.display())]
    RaggedRow {
        path: PathBuf,
        line: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Input table {} has no rows", path.display())]
    EmptyInput { path: PathBuf },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    // Pipeline stage errors
    #[error("Preprocessor transform failed: {table_error}; fallback on raw matrix failed: {matrix_error}")]
    Preprocess {
        table_error: String,
        matrix_error: String,
    },

    #[error("No supported prediction interface: {reason}")]
    UnsupportedModel { reason: String },

    #[error("Inference failed: {0}")]
    Inference(String),

    // Output errors
    #[error("Failed to write results to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Schema problems that are rejected instead of silently propagated
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("feature list is empty")]
    EmptyFeatureList,

    #[error("feature list contains duplicate name '{0}'")]
    DuplicateFeature(String),

    #[error("default for '{column}' must be a number, boolean or string, got {got}")]
    UnsupportedDefault { column: String, got: String },

    #[error("default for '{column}' is {got} but the column holds {expected} values")]
    IncompatibleDefault {
        column: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("column '{0}' is not numeric and cannot be passed as a matrix")]
    NonNumericColumn(String),

    #[error("column '{column}' has {actual} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        actual: usize,
    },
}
