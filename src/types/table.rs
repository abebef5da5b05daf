//! In-memory tabular data with explicit missing cells

use crate::error::ValidationError;
use ndarray::Array2;
use std::fmt;

/// A present cell value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    /// Human readable type name used in validation messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "numeric",
            Value::Text(_) => "text",
        }
    }

    /// Parse a raw field: numbers become `Number`, everything else `Text`
    pub fn parse(raw: &str) -> Self {
        match raw.trim().parse::<f64>() {
            Ok(n) => Value::Number(n),
            Err(_) => Value::Text(raw.to_string()),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// A cell is either present or missing; `None` is the missing sentinel.
pub type Cell = Option<Value>;

/// Storage type of a column, derived from its present cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Every present cell is a number (an all-missing column counts as numeric)
    Numeric,
    /// At least one present cell is text
    Text,
}

impl ColumnKind {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
        }
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub cells: Vec<Cell>,
}

impl Column {
    pub fn new(name: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            name: name.into(),
            cells,
        }
    }

    /// Column of `n_rows` copies of `value` (`None` gives an all-missing column)
    pub fn filled(name: impl Into<String>, value: Cell, n_rows: usize) -> Self {
        Self::new(name, vec![value; n_rows])
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn kind(&self) -> ColumnKind {
        if self
            .cells
            .iter()
            .flatten()
            .any(|v| matches!(v, Value::Text(_)))
        {
            ColumnKind::Text
        } else {
            ColumnKind::Numeric
        }
    }

    /// True when every cell is missing
    pub fn is_all_missing(&self) -> bool {
        self.cells.iter().all(Option::is_none)
    }

    pub fn missing_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_none()).count()
    }

    /// Replace every missing cell with `value`
    pub fn fill_missing(&mut self, value: &Value) {
        for cell in self.cells.iter_mut().filter(|c| c.is_none()) {
            *cell = Some(value.clone());
        }
    }
}

/// Rows x named columns, column-major
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    columns: Vec<Column>,
    n_rows: usize,
}

impl Table {
    /// Table with `n_rows` rows and no columns yet
    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            columns: Vec::new(),
            n_rows,
        }
    }

    /// Build a table from columns that must all share one length
    pub fn from_columns(columns: Vec<Column>) -> Result<Self, ValidationError> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        let mut table = Self::with_rows(n_rows);
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// First column with the given name
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn push_column(&mut self, column: Column) -> Result<(), ValidationError> {
        let actual = column.len();
        if actual != self.n_rows {
            return Err(ValidationError::RaggedColumn {
                column: column.name,
                expected: self.n_rows,
                actual,
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }

    /// Cell at (row, col) by position
    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.columns.get(col).and_then(|c| c.cells.get(row))
    }

    /// First `k` rows
    pub fn head(&self, k: usize) -> Table {
        let n = k.min(self.n_rows);
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.cells[..n].to_vec()))
                .collect(),
            n_rows: n,
        }
    }

    /// Positional side-by-side concatenation; rows beyond the shorter table are dropped.
    /// Column names may repeat.
    pub fn hconcat(&self, other: &Table) -> Table {
        let n = self.n_rows.min(other.n_rows);
        let left = self.head(n);
        let right = other.head(n);
        let mut columns = left.columns;
        columns.extend(right.columns);
        Table { columns, n_rows: n }
    }

    /// Row-major f32 matrix of the table's values. Missing cells become NaN.
    pub fn to_matrix(&self) -> Result<Array2<f32>, ValidationError> {
        if let Some(text) = self.columns.iter().find(|c| c.kind() == ColumnKind::Text) {
            return Err(ValidationError::NonNumericColumn(text.name.clone()));
        }

        let n_cols = self.columns.len();
        Ok(Array2::from_shape_fn((self.n_rows, n_cols), |(row, col)| {
            self.columns[col].cells[row]
                .as_ref()
                .and_then(Value::as_number)
                .map(|n| n as f32)
                .unwrap_or(f32::NAN)
        }))
    }
}

/// Renders like a right-aligned console table without an index column
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| {
                c.cells
                    .iter()
                    .map(|cell| match cell {
                        Some(v) => v.to_string(),
                        None => "NaN".to_string(),
                    })
                    .collect()
            })
            .collect();

        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&rendered)
            .map(|(c, cells)| {
                cells
                    .iter()
                    .map(|s| s.chars().count())
                    .chain(std::iter::once(c.name.chars().count()))
                    .max()
                    .unwrap_or(0)
            })
            .collect();

        let header: Vec<String> = self
            .columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:>w$}", c.name, w = *w))
            .collect();
        write!(f, "{}", header.join(" "))?;

        for row in 0..self.n_rows {
            let line: Vec<String> = rendered
                .iter()
                .zip(&widths)
                .map(|(cells, w)| format!("{:>w$}", cells[row], w = *w))
                .collect();
            write!(f, "\n{}", line.join(" "))?;
        }
        Ok(())
    }
}
