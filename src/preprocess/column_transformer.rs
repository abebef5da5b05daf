//! Fitted column transformer stored as JSON.
//!
//! Each step selects columns by name and either standardizes them, one-hot encodes
//! them, or passes them through. Output columns are emitted step by step, then the
//! remainder (if kept), matching how the fitted pipeline laid them out.
//!
//! ```json
//! {
//!   "feature_names_in": ["age", "country"],
//!   "transformers": [
//!     {"kind": "standard_scaler", "columns": ["age"], "mean": [40.0], "scale": [12.5]},
//!     {"kind": "one_hot", "columns": ["country"], "categories": [["DE", "US"]]}
//!   ],
//!   "remainder": "drop"
//! }
//! ```

use super::Transformer;
use crate::artifacts::ArtifactFormat;
use crate::error::ValidationError;
use crate::types::{Column, Table, Value};
use anyhow::{anyhow, bail, ensure, Result};
use ndarray::{Array2, ArrayView2};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;

/// What to do with a category that was not seen during fitting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Emit an all-zero block
    #[default]
    Ignore,
    Error,
}

/// Columns not named by any step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remainder {
    #[default]
    Drop,
    Passthrough,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum StepDef {
    StandardScaler {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<JsonValue>>,
        #[serde(default)]
        handle_unknown: HandleUnknown,
    },
    Passthrough {
        columns: Vec<String>,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct ColumnTransformerDef {
    #[serde(default)]
    feature_names_in: Option<Vec<String>>,
    transformers: Vec<StepDef>,
    #[serde(default)]
    remainder: Remainder,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Scale {
        columns: Vec<String>,
        mean: Vec<f64>,
        scale: Vec<f64>,
    },
    OneHot {
        columns: Vec<String>,
        categories: Vec<Vec<Value>>,
        handle_unknown: HandleUnknown,
    },
    Passthrough {
        columns: Vec<String>,
    },
}

impl Step {
    fn columns(&self) -> &[String] {
        match self {
            Step::Scale { columns, .. }
            | Step::OneHot { columns, .. }
            | Step::Passthrough { columns } => columns,
        }
    }

    fn width(&self) -> usize {
        match self {
            Step::OneHot { categories, .. } => categories.iter().map(Vec::len).sum(),
            other => other.columns().len(),
        }
    }
}

fn category_value(raw: JsonValue) -> Result<Value> {
    match raw {
        JsonValue::Number(n) => n
            .as_f64()
            .map(Value::Number)
            .ok_or_else(|| anyhow!("category {} is not representable", n)),
        JsonValue::String(s) => Ok(Value::Text(s)),
        JsonValue::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
        other => bail!("unsupported category value {}", other),
    }
}

impl TryFrom<StepDef> for Step {
    type Error = anyhow::Error;

    fn try_from(def: StepDef) -> Result<Self> {
        match def {
            StepDef::StandardScaler {
                columns,
                mean,
                scale,
            } => {
                ensure!(
                    mean.len() == columns.len() && scale.len() == columns.len(),
                    "standard_scaler has {} columns but {} means and {} scales",
                    columns.len(),
                    mean.len(),
                    scale.len()
                );
                // Zero variance features are left unscaled
                let scale = scale
                    .into_iter()
                    .map(|s| if s == 0.0 { 1.0 } else { s })
                    .collect();
                Ok(Step::Scale {
                    columns,
                    mean,
                    scale,
                })
            }
            StepDef::OneHot {
                columns,
                categories,
                handle_unknown,
            } => {
                ensure!(
                    categories.len() == columns.len(),
                    "one_hot has {} columns but {} category lists",
                    columns.len(),
                    categories.len()
                );
                let categories = categories
                    .into_iter()
                    .map(|list| list.into_iter().map(category_value).collect())
                    .collect::<Result<Vec<Vec<Value>>>>()?;
                Ok(Step::OneHot {
                    columns,
                    categories,
                    handle_unknown,
                })
            }
            StepDef::Passthrough { columns } => Ok(Step::Passthrough { columns }),
        }
    }
}

/// A fitted column transformer
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnTransformer {
    feature_names_in: Option<Vec<String>>,
    steps: Vec<Step>,
    remainder: Remainder,
}

impl ColumnTransformer {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let def: ColumnTransformerDef = serde_json::from_slice(bytes)?;
        ensure!(!def.transformers.is_empty(), "column transformer has no steps");

        let steps = def
            .transformers
            .into_iter()
            .map(Step::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            feature_names_in: def.feature_names_in,
            steps,
            remainder: def.remainder,
        })
    }

    fn remainder_columns<'t>(&self, table: &'t Table) -> Vec<&'t Column> {
        if self.remainder == Remainder::Drop {
            return Vec::new();
        }
        let used: HashSet<&str> = self
            .steps
            .iter()
            .flat_map(|s| s.columns())
            .map(String::as_str)
            .collect();
        table
            .columns()
            .iter()
            .filter(|c| !used.contains(c.name.as_str()))
            .collect()
    }

    fn transform(&self, table: &Table) -> Result<Array2<f32>> {
        let remainder = self.remainder_columns(table);
        let width = self.steps.iter().map(Step::width).sum::<usize>() + remainder.len();
        let mut out = Array2::<f32>::zeros((table.n_rows(), width));

        let lookup = |name: &str| {
            table
                .column(name)
                .ok_or_else(|| anyhow!("column '{}' is missing from the input", name))
        };

        let mut offset = 0;
        for step in &self.steps {
            match step {
                Step::Scale {
                    columns,
                    mean,
                    scale,
                } => {
                    for (j, name) in columns.iter().enumerate() {
                        let values = numeric(lookup(name)?)?;
                        for (i, v) in values.into_iter().enumerate() {
                            out[[i, offset + j]] = ((v - mean[j]) / scale[j]) as f32;
                        }
                    }
                }
                Step::OneHot {
                    columns,
                    categories,
                    handle_unknown,
                } => {
                    let mut block = offset;
                    for (name, cats) in columns.iter().zip(categories) {
                        let column = lookup(name)?;
                        for (i, cell) in column.cells.iter().enumerate() {
                            let hit = cell
                                .as_ref()
                                .and_then(|v| cats.iter().position(|c| c == v));
                            match (hit, handle_unknown) {
                                (Some(k), _) => out[[i, block + k]] = 1.0,
                                (None, HandleUnknown::Ignore) => {}
                                (None, HandleUnknown::Error) => bail!(
                                    "found unknown category {} in column '{}' during transform",
                                    cell.as_ref()
                                        .map(ToString::to_string)
                                        .unwrap_or_else(|| "<missing>".to_string()),
                                    name
                                ),
                            }
                        }
                        block += cats.len();
                    }
                }
                Step::Passthrough { columns } => {
                    for (j, name) in columns.iter().enumerate() {
                        for (i, v) in numeric(lookup(name)?)?.into_iter().enumerate() {
                            out[[i, offset + j]] = v as f32;
                        }
                    }
                }
            }
            offset += step.width();
        }

        for (j, column) in remainder.into_iter().enumerate() {
            for (i, v) in numeric(column)?.into_iter().enumerate() {
                out[[i, offset + j]] = v as f32;
            }
        }

        Ok(out)
    }
}

/// Numeric view of a column; missing cells become NaN
fn numeric(column: &Column) -> std::result::Result<Vec<f64>, ValidationError> {
    column
        .cells
        .iter()
        .map(|cell| match cell {
            Some(Value::Number(n)) => Ok(*n),
            None => Ok(f64::NAN),
            Some(Value::Text(_)) => Err(ValidationError::NonNumericColumn(column.name.clone())),
        })
        .collect()
}

impl Transformer for ColumnTransformer {
    fn transform_table(&mut self, table: &Table) -> Result<Array2<f32>> {
        self.transform(table)
    }

    /// Columns are resolved by position through `feature_names_in`
    fn transform_matrix(&mut self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let names = self
            .feature_names_in
            .as_ref()
            .ok_or_else(|| anyhow!("feature_names_in is required to transform an unnamed matrix"))?;
        ensure!(
            names.len() == x.ncols(),
            "matrix has {} columns, transformer was fitted on {}",
            x.ncols(),
            names.len()
        );

        let columns = names
            .iter()
            .zip(x.columns())
            .map(|(name, values)| {
                let cells = values
                    .iter()
                    .map(|&v| (!v.is_nan()).then_some(Value::Number(v as f64)))
                    .collect();
                Column::new(name.clone(), cells)
            })
            .collect();
        self.transform(&Table::from_columns(columns)?)
    }
}

/// Decodes column transformer JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnTransformerFormat;

impl ArtifactFormat<super::Preprocessor> for ColumnTransformerFormat {
    fn name(&self) -> &'static str {
        "column-transformer-json"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> Result<super::Preprocessor> {
        ColumnTransformer::from_json_slice(bytes).map(super::Preprocessor::from)
    }
}
