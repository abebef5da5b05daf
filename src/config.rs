//! Configuration management for the prediction tool

use anyhow::{Context, Result};
use config::{Config, File};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Log output format
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines on stderr
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub preview: PreviewConfig,
    pub logging: LoggingConfig,
}

/// Input table parsing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Field delimiter (single ASCII character)
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: u8,
    /// Tokens read as missing values
    pub na_values: Vec<String>,
}

/// Result file writing
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Field delimiter (single ASCII character)
    #[serde(deserialize_with = "deserialize_delimiter")]
    pub delimiter: u8,
}

/// Console preview
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreviewConfig {
    /// Rows printed after a run
    pub sample_rows: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, json)
    pub format: LogFormat,
}

fn default_na_values() -> Vec<String> {
    [
        "", "NA", "N/A", "n/a", "NaN", "nan", "-NaN", "-nan", "null", "NULL", "None", "<NA>",
        "#N/A",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn deserialize_delimiter<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as SerdeError;

    let raw = String::deserialize(deserializer)?;
    let raw = if raw == "\\t" { "\t".to_string() } else { raw };
    match raw.as_bytes() {
        [b] if b.is_ascii() => Ok(*b),
        _ => Err(SerdeError::custom(format!(
            "delimiter must be a single ASCII character, got {:?}",
            raw
        ))),
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: b',',
            na_values: default_na_values(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self { sample_rows: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional file; without one the defaults apply.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
