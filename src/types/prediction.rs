//! Prediction output data structures

use ndarray::Array2;
use std::fmt;

/// Predicted class label
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Label {
    Int(i64),
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Int(i) => write!(f, "{}", i),
            Label::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<usize> for Label {
    fn from(class: usize) -> Self {
        Label::Int(class as i64)
    }
}

/// Normalized model output: one label per row, optional `[rows, classes]` probabilities
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub labels: Vec<Label>,
    pub probabilities: Option<Array2<f32>>,
}

impl Predictions {
    pub fn n_rows(&self) -> usize {
        self.labels.len()
    }

    pub fn n_classes(&self) -> Option<usize> {
        self.probabilities.as_ref().map(|p| p.ncols())
    }

    /// Highest class probability per row
    pub fn top_probabilities(&self) -> Option<Vec<f32>> {
        self.probabilities.as_ref().map(|p| {
            p.rows()
                .into_iter()
                .map(|row| row.iter().copied().fold(f32::NEG_INFINITY, f32::max))
                .collect()
        })
    }
}
