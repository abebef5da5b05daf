//! Input alignment for model inference.
//!
//! Reshapes an arbitrary input table so that its columns match the feature list
//! used during training: same names, same order, no missing cells.

use crate::artifacts::{FeatureList, Metadata};
use crate::error::ValidationError;
use crate::types::{Column, ColumnKind, Table, Value};
use tracing::debug;

/// Aligns input tables to the training-time feature list.
///
/// Training-time defaults from metadata always take precedence over the
/// type-based fallback (0 for numeric columns, "" for text columns).
pub struct InputAligner<'a> {
    features: &'a FeatureList,
    metadata: Option<&'a Metadata>,
}

impl<'a> InputAligner<'a> {
    /// Create a new aligner.
    pub fn new(features: &'a FeatureList, metadata: Option<&'a Metadata>) -> Self {
        Self { features, metadata }
    }

    /// Align a table.
    ///
    /// Absent feature columns are inserted (default or missing), extra columns are
    /// dropped, columns are reordered, and remaining missing cells are filled.
    pub fn align(&self, table: Table) -> Result<Table, ValidationError> {
        let n_rows = table.n_rows();
        let mut available: Vec<Option<Column>> =
            table.into_columns().into_iter().map(Some).collect();

        let mut aligned = Table::with_rows(n_rows);
        let mut inserted = 0usize;
        for name in self.features.iter() {
            let existing = available
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|c| c.name == name))
                .and_then(Option::take);

            let column = match existing {
                Some(column) => column,
                None => {
                    inserted += 1;
                    Column::filled(name, self.default_for(name).cloned(), n_rows)
                }
            };
            aligned.push_column(column)?;
        }

        let dropped: Vec<String> = available.into_iter().flatten().map(|c| c.name).collect();
        debug!(
            features = self.features.len(),
            inserted,
            dropped = ?dropped,
            "Input columns aligned to feature list"
        );

        let mut columns = aligned.into_columns();
        for column in columns.iter_mut().filter(|c| c.missing_count() > 0) {
            let fill = self.fill_value(column)?;
            debug!(
                column = %column.name,
                missing = column.missing_count(),
                fill = %fill,
                "Filling missing cells"
            );
            column.fill_missing(&fill);
        }

        Table::from_columns(columns)
    }

    /// Number of features the model expects.
    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    fn default_for(&self, column: &str) -> Option<&Value> {
        self.metadata.and_then(|m| m.default_for(column))
    }

    fn fill_value(&self, column: &Column) -> Result<Value, ValidationError> {
        let kind = column.kind();

        match self.default_for(&column.name) {
            Some(default) => {
                let compatible = column.is_all_missing()
                    || matches!(
                        (kind, default),
                        (ColumnKind::Numeric, Value::Number(_)) | (ColumnKind::Text, Value::Text(_))
                    );
                if !compatible {
                    return Err(ValidationError::IncompatibleDefault {
                        column: column.name.clone(),
                        expected: kind.name(),
                        got: default.kind_name(),
                    });
                }
                Ok(default.clone())
            }
            None => Ok(match kind {
                ColumnKind::Numeric => Value::Number(0.0),
                ColumnKind::Text => Value::Text(String::new()),
            }),
        }
    }
}
