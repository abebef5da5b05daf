//! Artifact loading with ordered format fallbacks

pub mod features;
pub mod metadata;

pub use features::{load_features, FeatureList};
pub use metadata::{load_metadata, Metadata};

use crate::error::{FormatFailure, PredictError, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// One way of decoding an artifact's bytes
pub trait ArtifactFormat<T> {
    /// Short format name used in logs and errors
    fn name(&self) -> &'static str;

    /// Decode the fully read file contents
    fn decode(&self, path: &Path, bytes: &[u8]) -> anyhow::Result<T>;
}

/// Read `path` to completion, failing with `NotFound` before touching any decoder.
pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        return Err(PredictError::NotFound {
            path: path.to_path_buf(),
        });
    }
    std::fs::read(path).map_err(|source| PredictError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an artifact by trying each format in order; the first that decodes wins.
///
/// When every format fails the returned error carries each format's cause.
pub fn load_artifact<T>(path: &Path, formats: &[&dyn ArtifactFormat<T>]) -> Result<T> {
    let bytes = read_artifact(path)?;
    let mut failures = Vec::with_capacity(formats.len());

    for format in formats {
        match format.decode(path, &bytes) {
            Ok(artifact) => {
                if !failures.is_empty() {
                    warn!(
                        path = %path.display(),
                        format = format.name(),
                        skipped = failures.len(),
                        "Artifact loaded with fallback format"
                    );
                }
                info!(path = %path.display(), format = format.name(), "Artifact loaded");
                return Ok(artifact);
            }
            Err(e) => {
                debug!(path = %path.display(), format = format.name(), error = %e, "Format did not match");
                failures.push(FormatFailure {
                    format: format.name(),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    Err(PredictError::Deserialize {
        path: path.to_path_buf(),
        failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{bail, Context};
    use std::io::Write;

    struct Utf8Format;

    impl ArtifactFormat<String> for Utf8Format {
        fn name(&self) -> &'static str {
            "utf8"
        }

        fn decode(&self, _path: &Path, bytes: &[u8]) -> anyhow::Result<String> {
            String::from_utf8(bytes.to_vec()).context("not utf-8")
        }
    }

    struct Rejecting(&'static str);

    impl ArtifactFormat<String> for Rejecting {
        fn name(&self) -> &'static str {
            self.0
        }

        fn decode(&self, _path: &Path, _bytes: &[u8]) -> anyhow::Result<String> {
            bail!("{} rejected", self.0)
        }
    }

    fn temp_file(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents).unwrap();
        file
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = load_artifact::<String>(Path::new("/no/such/model.onnx"), &[&Utf8Format])
            .unwrap_err();
        assert!(matches!(err, PredictError::NotFound { .. }));
        assert!(err.to_string().contains("/no/such/model.onnx"));
    }

    #[test]
    fn test_fallback_format_used() {
        let file = temp_file(b"hello");
        let loaded =
            load_artifact::<String>(file.path(), &[&Rejecting("first"), &Utf8Format]).unwrap();
        assert_eq!(loaded, "hello");
    }

    #[test]
    fn test_all_failures_accumulated() {
        let file = temp_file(&[0xff, 0xfe]);
        let err = load_artifact::<String>(file.path(), &[&Rejecting("first"), &Utf8Format])
            .unwrap_err();

        match err {
            PredictError::Deserialize { failures, .. } => {
                assert_eq!(failures.len(), 2);
                assert_eq!(failures[0].format, "first");
                assert!(failures[0].message.contains("first rejected"));
                assert_eq!(failures[1].format, "utf8");
                assert!(failures[1].message.contains("not utf-8"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
