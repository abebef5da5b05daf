//! Delimited text input reader

use crate::config::InputConfig;
use crate::error::{PredictError, Result};
use crate::types::{Column, Table, Value};
use std::path::Path;
use tracing::info;

/// Read a delimited file with a header row into a typed table.
///
/// Cells matching one of the configured missing-value tokens become missing.
/// A column whose present cells all parse as numbers is numeric; any other
/// column keeps every present cell as text.
pub fn read_table(path: &Path, config: &InputConfig) -> Result<Table> {
    if !path.exists() {
        return Err(PredictError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let csv_error = |source| PredictError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(config.delimiter)
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_path(path)
        .map_err(csv_error)?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(str::to_string)
        .collect();

    let mut raw: Vec<Vec<Option<String>>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        if record.len() > headers.len() {
            return Err(PredictError::RaggedRow {
                path: path.to_path_buf(),
                line: record.position().map(|p| p.line()).unwrap_or_default(),
                expected: headers.len(),
                actual: record.len(),
            });
        }
        // short rows are padded with missing cells
        for (i, cells) in raw.iter_mut().enumerate() {
            let cell = record.get(i).and_then(|field| {
                let missing = config.na_values.iter().any(|na| na == field.trim());
                (!missing).then(|| field.to_string())
            });
            cells.push(cell);
        }
    }

    let n_rows = raw.first().map(Vec::len).unwrap_or(0);
    if n_rows == 0 {
        return Err(PredictError::EmptyInput {
            path: path.to_path_buf(),
        });
    }

    let columns = headers
        .into_iter()
        .zip(raw)
        .map(|(name, cells)| typed_column(name, cells))
        .collect();
    let table = Table::from_columns(columns)?;

    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.n_cols(),
        "Input table loaded"
    );
    Ok(table)
}

fn typed_column(name: String, cells: Vec<Option<String>>) -> Column {
    let numeric = cells
        .iter()
        .flatten()
        .all(|raw| raw.trim().parse::<f64>().is_ok());

    let cells = cells
        .into_iter()
        .map(|cell| {
            let raw = cell?;
            if !numeric {
                return Some(Value::Text(raw));
            }
            // spellings like "NAN" parse as a float but are still missing
            match Value::parse(&raw) {
                Value::Number(n) if n.is_nan() => None,
                value => Some(value),
            }
        })
        .collect();
    Column::new(name, cells)
}
