//! Model metadata: training-time default fill values and free-form extras

use super::read_artifact;
use crate::error::{PredictError, Result, ValidationError};
use crate::types::Value;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

/// Raw metadata document as written by the training job
#[derive(Debug, Deserialize)]
struct MetadataDocument {
    #[serde(default)]
    feature_defaults: Option<Map<String, JsonValue>>,
    #[serde(default)]
    defaults: Option<Map<String, JsonValue>>,
    #[serde(flatten)]
    extra: Map<String, JsonValue>,
}

/// Why a metadata document was rejected
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Parsed metadata
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    defaults: HashMap<String, Value>,
    extra: Map<String, JsonValue>,
}

impl Metadata {
    /// Metadata holding only default fill values
    pub fn with_defaults(defaults: HashMap<String, Value>) -> Self {
        Self {
            defaults,
            extra: Map::new(),
        }
    }

    /// Parse a JSON object.
    ///
    /// Defaults are read from `feature_defaults`, or from `defaults` when the former
    /// is absent or empty. Each default must be a number, boolean or string.
    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, MetadataError> {
        let doc: MetadataDocument = serde_json::from_slice(bytes)?;

        let raw = match doc.feature_defaults {
            Some(map) if !map.is_empty() => map,
            _ => doc.defaults.unwrap_or_default(),
        };

        let defaults = raw
            .into_iter()
            .map(|(column, value)| {
                let value = default_value(&column, value)?;
                Ok((column, value))
            })
            .collect::<std::result::Result<HashMap<_, _>, ValidationError>>()?;

        Ok(Self {
            defaults,
            extra: doc.extra,
        })
    }

    /// Training-time default for a column, if one was shipped
    pub fn default_for(&self, column: &str) -> Option<&Value> {
        self.defaults.get(column)
    }

    pub fn defaults(&self) -> &HashMap<String, Value> {
        &self.defaults
    }

    /// Keys other than the defaults (model name, version, metrics, ...)
    pub fn extra(&self) -> &Map<String, JsonValue> {
        &self.extra
    }
}

fn default_value(column: &str, value: JsonValue) -> std::result::Result<Value, ValidationError> {
    let unsupported = |got: &str| ValidationError::UnsupportedDefault {
        column: column.to_string(),
        got: got.to_string(),
    };

    match value {
        JsonValue::Number(n) => n.as_f64().map(Value::Number).ok_or_else(|| unsupported("number")),
        JsonValue::Bool(b) => Ok(Value::Number(if b { 1.0 } else { 0.0 })),
        JsonValue::String(s) => Ok(Value::Text(s)),
        JsonValue::Null => Err(unsupported("null")),
        JsonValue::Array(_) => Err(unsupported("array")),
        JsonValue::Object(_) => Err(unsupported("object")),
    }
}

/// Load and validate a metadata JSON file
pub fn load_metadata(path: &Path) -> Result<Metadata> {
    let bytes = read_artifact(path)?;
    let metadata = Metadata::parse(&bytes).map_err(|e| match e {
        MetadataError::Json(e) => PredictError::Metadata {
            path: path.to_path_buf(),
            details: e.to_string(),
        },
        MetadataError::Validation(e) => PredictError::Validation(e),
    })?;

    info!(
        path = %path.display(),
        defaults = metadata.defaults.len(),
        "Metadata loaded"
    );
    debug!(keys = ?metadata.extra.keys().collect::<Vec<_>>(), "Additional metadata keys");

    Ok(metadata)
}
