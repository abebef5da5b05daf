//! Preprocessing graphs exported to ONNX

use super::Transformer;
use crate::error::ValidationError;
use crate::models::onnx::{extract_matrix, matrix_tensor, NamedInputs, OnnxModel};
use crate::types::{Cell, Column, Table, Value};
use anyhow::{anyhow, Result};
use ndarray::{Array2, ArrayView2};
use ort::tensor::TensorElementType;
use ort::value::Tensor;

/// Runs an ONNX preprocessing graph and returns its first output
pub struct OnnxTransformer {
    model: OnnxModel,
}

impl OnnxTransformer {
    pub fn new(model: OnnxModel) -> Self {
        Self { model }
    }

    fn run(&mut self, inputs: NamedInputs) -> Result<Array2<f32>> {
        let output_name = self
            .model
            .output_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("preprocessing graph declares no outputs"))?;

        self.model.run_with(inputs, |outputs| {
            let value = outputs
                .get(output_name.as_str())
                .ok_or_else(|| anyhow!("graph produced no output named '{}'", output_name))?;
            extract_matrix(value)
        })
    }
}

impl Transformer for OnnxTransformer {
    /// One `[rows, 1]` tensor per graph input, taken from the column of the same name
    fn transform_table(&mut self, table: &Table) -> Result<Array2<f32>> {
        let n_rows = table.n_rows();
        let mut inputs = NamedInputs::with_capacity(self.model.input_names().len());

        for (index, name) in self.model.input_names().iter().enumerate() {
            let column = table
                .column(name)
                .ok_or_else(|| anyhow!("no column for graph input '{}'", name))?;

            let value = match self.model.input_type(index) {
                Some(TensorElementType::String) => {
                    let texts: Vec<String> = column.cells.iter().map(cell_text).collect();
                    Tensor::from_string_array(([n_rows, 1], &*texts))?.into()
                }
                Some(TensorElementType::Int64) => {
                    let values = numeric_cells(column, |n| n as i64)?;
                    Tensor::from_array(([n_rows, 1], values))?.into()
                }
                Some(TensorElementType::Float64) => {
                    let values = numeric_cells(column, |n| n)?;
                    Tensor::from_array(([n_rows, 1], values))?.into()
                }
                _ => {
                    let values = numeric_cells(column, |n| n as f32)?;
                    matrix_tensor(ArrayView2::from_shape((n_rows, 1), &values)?)?
                }
            };
            inputs.push((name.clone(), value));
        }

        self.run(inputs)
    }

    fn transform_matrix(&mut self, x: ArrayView2<'_, f32>) -> Result<Array2<f32>> {
        let inputs = self.model.matrix_inputs(x)?;
        self.run(inputs)
    }
}

/// Numbers as text for string inputs; missing cells become empty strings
fn cell_text(cell: &Cell) -> String {
    match cell {
        Some(Value::Text(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        None => String::new(),
    }
}

fn numeric_cells<T>(column: &Column, convert: impl Fn(f64) -> T) -> Result<Vec<T>> {
    column
        .cells
        .iter()
        .map(|cell| match cell {
            Some(Value::Number(n)) => Ok(convert(*n)),
            None => Ok(convert(f64::NAN)),
            Some(Value::Text(_)) => Err(ValidationError::NonNumericColumn(column.name.clone()).into()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::onnx::fixtures;
    use ndarray::array;

    fn transformer(bytes: &[u8]) -> OnnxTransformer {
        OnnxTransformer::new(OnnxModel::from_bytes(bytes).unwrap())
    }

    fn numbers(values: &[f64]) -> Vec<Cell> {
        values.iter().map(|&n| Some(Value::Number(n))).collect()
    }

    #[test]
    fn test_named_inputs_bound_by_column_name() {
        let table = Table::from_columns(vec![
            Column::new("b", numbers(&[3.0, 4.0])),
            Column::new("extra", numbers(&[9.0, 9.0])),
            Column::new("a", numbers(&[1.0, 2.0])),
        ])
        .unwrap();

        let out = transformer(&fixtures::concat_preprocessor())
            .transform_table(&table)
            .unwrap();
        assert_eq!(out, array![[1.0f32, 3.0], [2.0, 4.0]]);
    }

    #[test]
    fn test_missing_graph_input_column() {
        let table = Table::from_columns(vec![Column::new("a", numbers(&[1.0]))]).unwrap();
        let err = transformer(&fixtures::concat_preprocessor())
            .transform_table(&table)
            .unwrap_err();
        assert!(err.to_string().contains("'b'"));
    }

    #[test]
    fn test_matrix_form_uses_single_input() {
        let out = transformer(&fixtures::doubling_preprocessor())
            .transform_matrix(array![[1.0f32, 2.0], [3.0, 4.0]].view())
            .unwrap();
        assert_eq!(out, array![[2.0f32, 4.0], [6.0, 8.0]]);
    }

    #[test]
    fn test_text_column_feeds_string_input() {
        let table = Table::from_columns(vec![
            Column::new(
                "color",
                vec![
                    Some(Value::Text("red".to_string())),
                    Some(Value::Text("blue".to_string())),
                ],
            ),
            Column::new("x", numbers(&[0.5, 1.5])),
        ])
        .unwrap();

        let out = transformer(&fixtures::color_preprocessor())
            .transform_table(&table)
            .unwrap();
        assert_eq!(out, array![[1.0f32, 0.5], [0.0, 1.5]]);
    }

    #[test]
    fn test_text_column_rejected_for_float_input() {
        let table = Table::from_columns(vec![
            Column::new("a", vec![Some(Value::Text("low".to_string()))]),
            Column::new("b", numbers(&[1.0])),
        ])
        .unwrap();

        let err = transformer(&fixtures::concat_preprocessor())
            .transform_table(&table)
            .unwrap_err();
        assert!(err.to_string().contains("'a'"));
    }
}
