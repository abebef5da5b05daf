//! Result table assembly, persistence and preview

use crate::error::{PredictError, Result};
use crate::types::{Cell, Column, Label, Predictions, Table, Value};
use ndarray::Array2;
use std::path::Path;
use tracing::info;

/// Class counts above this are packed into one `proba` column
pub const MAX_EXPANDED_CLASSES: usize = 10;

/// Name of the label column
pub const PREDICTION_COLUMN: &str = "prediction";

/// How probabilities are laid out in the result
#[derive(Debug, Clone, PartialEq)]
pub enum ProbabilityLayout {
    Absent,
    /// One `proba_class_{i}` column per class
    Expanded(Array2<f32>),
    /// One `proba` column holding each row's full vector
    Packed(Array2<f32>),
}

/// Per-row predictions ready to be written or previewed
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    labels: Vec<Label>,
    probabilities: ProbabilityLayout,
}

impl ResultTable {
    /// Lay out predictions, expanding probabilities when there are few enough classes
    pub fn assemble(predictions: Predictions) -> Self {
        let probabilities = match predictions.probabilities {
            None => ProbabilityLayout::Absent,
            Some(p) if p.ncols() <= MAX_EXPANDED_CLASSES => ProbabilityLayout::Expanded(p),
            Some(p) => ProbabilityLayout::Packed(p),
        };
        Self {
            labels: predictions.labels,
            probabilities,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    pub fn probabilities(&self) -> &ProbabilityLayout {
        &self.probabilities
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut names = vec![PREDICTION_COLUMN.to_string()];
        match &self.probabilities {
            ProbabilityLayout::Absent => {}
            ProbabilityLayout::Expanded(p) => {
                names.extend((0..p.ncols()).map(|i| format!("proba_class_{}", i)));
            }
            ProbabilityLayout::Packed(_) => names.push("proba".to_string()),
        }
        names
    }

    /// Rendered cells of one row, in column order
    fn row_fields(&self, row: usize) -> Vec<String> {
        let mut fields = vec![self.labels[row].to_string()];
        match &self.probabilities {
            ProbabilityLayout::Absent => {}
            ProbabilityLayout::Expanded(p) => {
                fields.extend(p.row(row).iter().map(|v| v.to_string()));
            }
            ProbabilityLayout::Packed(p) => fields.push(packed_vector(p, row)),
        }
        fields
    }

    /// Typed table view of the result
    pub fn to_table(&self) -> Result<Table> {
        let prediction: Vec<Cell> = self
            .labels
            .iter()
            .map(|label| {
                Some(match label {
                    Label::Int(i) => Value::Number(*i as f64),
                    Label::Text(s) => Value::Text(s.clone()),
                })
            })
            .collect();

        let mut columns = vec![Column::new(PREDICTION_COLUMN, prediction)];
        match &self.probabilities {
            ProbabilityLayout::Absent => {}
            ProbabilityLayout::Expanded(p) => {
                for (i, class) in p.columns().into_iter().enumerate() {
                    columns.push(Column::new(
                        format!("proba_class_{}", i),
                        class.iter().map(|&v| Some(Value::Number(v as f64))).collect(),
                    ));
                }
            }
            ProbabilityLayout::Packed(p) => {
                columns.push(Column::new(
                    "proba",
                    (0..p.nrows())
                        .map(|row| Some(Value::Text(packed_vector(p, row))))
                        .collect(),
                ));
            }
        }

        Ok(Table::from_columns(columns)?)
    }

    /// Write the result with a header row
    pub fn write_csv(&self, path: &Path, delimiter: u8) -> Result<()> {
        let write_error = |source| PredictError::Write {
            path: path.to_path_buf(),
            source,
        };

        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_path(path)
            .map_err(write_error)?;

        writer
            .write_record(self.column_names())
            .map_err(write_error)?;
        for row in 0..self.n_rows() {
            writer
                .write_record(self.row_fields(row))
                .map_err(write_error)?;
        }
        writer
            .flush()
            .map_err(|e| write_error(csv::Error::from(e)))?;

        info!(path = %path.display(), rows = self.n_rows(), "Results written");
        Ok(())
    }

    /// First `k` raw input rows side by side with the first `k` result rows
    pub fn preview(&self, input: &Table, k: usize) -> Result<Table> {
        Ok(input.head(k).hconcat(&self.to_table()?.head(k)))
    }
}

/// A row's probabilities as a JSON array
fn packed_vector(p: &Array2<f32>, row: usize) -> String {
    let values: Vec<f32> = p.row(row).to_vec();
    serde_json::to_string(&values).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn predictions(labels: Vec<i64>, proba: Option<Array2<f32>>) -> Predictions {
        Predictions {
            labels: labels.into_iter().map(Label::Int).collect(),
            probabilities: proba,
        }
    }

    #[test]
    fn test_few_classes_expand() {
        let result = ResultTable::assemble(predictions(
            vec![1, 0],
            Some(array![[0.3f32, 0.7], [0.6, 0.4]]),
        ));

        assert_eq!(
            result.column_names(),
            vec!["prediction", "proba_class_0", "proba_class_1"]
        );
        let table = result.to_table().unwrap();
        assert_eq!(table.n_rows(), 2);
        assert_eq!(table.cell(0, 2), Some(&Some(Value::Number(0.7f32 as f64))));
    }

    #[test]
    fn test_ten_classes_still_expand() {
        let result = ResultTable::assemble(predictions(vec![0], Some(Array2::zeros((1, 10)))));
        assert_eq!(result.column_names().len(), 11);
        assert!(matches!(result.probabilities(), ProbabilityLayout::Expanded(_)));
    }

    #[test]
    fn test_many_classes_pack_into_one_column() {
        let proba = Array2::from_elem((3, 12), 1.0f32 / 12.0);
        let result = ResultTable::assemble(predictions(vec![0, 1, 2], Some(proba)));

        assert_eq!(result.column_names(), vec!["prediction", "proba"]);
        let table = result.to_table().unwrap();
        assert_eq!(table.n_rows(), 3);

        for row in 0..3 {
            let cell = table.cell(row, 1).cloned().flatten().unwrap();
            let vector: Vec<f32> = match cell {
                Value::Text(s) => serde_json::from_str(&s).unwrap(),
                other => panic!("expected packed vector, got {other:?}"),
            };
            assert_eq!(vector.len(), 12);
        }
    }

    #[test]
    fn test_label_only_result() {
        let result = ResultTable::assemble(Predictions {
            labels: vec![Label::Text("no".to_string()), Label::Text("yes".to_string())],
            probabilities: None,
        });
        assert_eq!(result.column_names(), vec!["prediction"]);
        assert_eq!(result.to_table().unwrap().n_cols(), 1);
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let result = ResultTable::assemble(predictions(vec![1], Some(array![[0.25f32, 0.75]])));

        result.write_csv(&path, b',').unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "prediction,proba_class_0,proba_class_1\n1,0.25,0.75\n"
        );
    }

    #[test]
    fn test_write_csv_packed_vector_is_quoted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let result = ResultTable::assemble(predictions(vec![0], Some(Array2::zeros((1, 11)))));

        result.write_csv(&path, b',').unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        let vector: Vec<f32> = serde_json::from_str(&record[1]).unwrap();
        assert_eq!(vector, vec![0.0; 11]);
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let result = ResultTable::assemble(predictions(vec![0], None));
        let err = result
            .write_csv(Path::new("/no/such/dir/out.csv"), b',')
            .unwrap_err();
        assert!(matches!(err, PredictError::Write { .. }));
    }

    #[test]
    fn test_preview_joins_input_and_results() {
        let input = Table::from_columns(vec![Column::new(
            "amount",
            vec![Some(Value::Number(10.0)), Some(Value::Number(20.0)), None],
        )])
        .unwrap();
        let result = ResultTable::assemble(predictions(vec![0, 1, 1], None));

        let preview = result.preview(&input, 2).unwrap();

        assert_eq!(preview.n_rows(), 2);
        assert_eq!(preview.column_names(), vec!["amount", "prediction"]);
        assert_eq!(preview.cell(1, 1), Some(&Some(Value::Number(1.0))));
    }
}
