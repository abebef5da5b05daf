//! Preprocessing adapter.
//!
//! A preprocessor is first called with the named, aligned table. If that fails it is
//! retried once with the bare value matrix; only when both fail does the run abort.

pub mod column_transformer;
pub mod onnx;

pub use column_transformer::{ColumnTransformer, ColumnTransformerFormat};
pub use onnx::OnnxTransformer;

use crate::artifacts::{load_artifact, ArtifactFormat};
use crate::error::{PredictError, Result};
use crate::models::{OnnxFormat, OnnxModel};
use crate::types::Table;
use anyhow::ensure;
use ndarray::{Array2, ArrayView2};
use std::path::Path;
use tracing::{debug, info, warn};

/// A fitted transform from a feature table to a model-ready matrix
pub trait Transformer {
    /// Transform with column names available
    fn transform_table(&mut self, table: &Table) -> anyhow::Result<Array2<f32>>;

    /// Transform the bare `[rows, cols]` matrix
    fn transform_matrix(&mut self, x: ArrayView2<'_, f32>) -> anyhow::Result<Array2<f32>>;
}

/// A loaded preprocessor
pub struct Preprocessor {
    kind: &'static str,
    inner: Box<dyn Transformer>,
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor").field("kind", &self.kind).finish()
    }
}

impl From<OnnxModel> for Preprocessor {
    fn from(model: OnnxModel) -> Self {
        Self::new("onnx", Box::new(OnnxTransformer::new(model)))
    }
}

impl From<ColumnTransformer> for Preprocessor {
    fn from(ct: ColumnTransformer) -> Self {
        Self::new("column_transformer", Box::new(ct))
    }
}

impl Preprocessor {
    pub fn new(kind: &'static str, inner: Box<dyn Transformer>) -> Self {
        Self { kind, inner }
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Transform the aligned table, falling back to its value matrix once
    pub fn apply(&mut self, table: &Table) -> Result<Array2<f32>> {
        let n_rows = table.n_rows();
        let check_rows = |x: Array2<f32>| -> anyhow::Result<Array2<f32>> {
            ensure!(
                x.nrows() == n_rows,
                "transform returned {} rows for {} input rows",
                x.nrows(),
                n_rows
            );
            Ok(x)
        };

        let table_error = match self.inner.transform_table(table).and_then(check_rows) {
            Ok(x) => {
                debug!(kind = self.kind, shape = ?x.shape(), "Preprocessed named table");
                return Ok(x);
            }
            Err(e) => e,
        };

        warn!(
            kind = self.kind,
            error = %format!("{:#}", table_error),
            "Named transform failed, retrying with the value matrix"
        );

        let matrix = table.to_matrix().map_err(anyhow::Error::from);
        match matrix
            .and_then(|m| self.inner.transform_matrix(m.view()))
            .and_then(check_rows)
        {
            Ok(x) => {
                debug!(kind = self.kind, shape = ?x.shape(), "Preprocessed value matrix");
                Ok(x)
            }
            Err(matrix_error) => Err(PredictError::Preprocess {
                table_error: format!("{:#}", table_error),
                matrix_error: format!("{:#}", matrix_error),
            }),
        }
    }
}

/// Load a preprocessor, trying ONNX first and column transformer JSON second
pub fn load_preprocessor(path: &Path) -> Result<Preprocessor> {
    let formats: [&dyn ArtifactFormat<Preprocessor>; 2] = [&OnnxFormat, &ColumnTransformerFormat];
    let preprocessor = load_artifact(path, &formats)?;
    info!(path = %path.display(), kind = preprocessor.kind(), "Preprocessor loaded");
    Ok(preprocessor)
}
