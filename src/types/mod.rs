//! Type definitions for the prediction pipeline

pub mod prediction;
pub mod table;

pub use prediction::{Label, Predictions};
pub use table::{Cell, Column, ColumnKind, Table, Value};
