//! Feature list loading.
//!
//! The feature list fixes the exact column order the model (or its preprocessor)
//! was trained on. It is usually saved as a NumPy `.npy` string array, but JSON
//! arrays and plain newline-separated files are accepted too. Every element is
//! coerced to a string regardless of its stored type.

use super::{load_artifact, ArtifactFormat};
use crate::error::{Result, ValidationError};
use anyhow::{anyhow, bail, ensure, Context};
use std::collections::HashSet;
use std::path::Path;

/// Ordered, duplicate-free list of feature names
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureList {
    names: Vec<String>,
}

impl FeatureList {
    /// Validate and wrap feature names. Empty lists and duplicates are rejected.
    pub fn new(names: Vec<String>) -> std::result::Result<Self, ValidationError> {
        if names.is_empty() {
            return Err(ValidationError::EmptyFeatureList);
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateFeature(name.clone()));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}

/// Load a feature list, trying `.npy`, then JSON, then plain text.
pub fn load_features(path: &Path) -> Result<FeatureList> {
    let names = load_artifact::<Vec<String>>(
        path,
        &[&NpyFormat, &JsonListFormat, &TextListFormat],
    )?;
    Ok(FeatureList::new(names)?)
}

/// NumPy `.npy` array of strings or numbers
pub struct NpyFormat;

type NpyReader = fn(&[u8]) -> anyhow::Result<Vec<String>>;

/// Element readers tried in order; npyz rejects a reader whose dtype does not match.
const NPY_READERS: &[NpyReader] = &[
    |b| Ok(read_npy::<String>(b)?.into_iter().map(trim_nul).collect()),
    |b| read_npy::<Vec<u8>>(b)?.into_iter().map(byte_string).collect(),
    |b| display_all(read_npy::<i64>(b)?),
    |b| display_all(read_npy::<i32>(b)?),
    |b| display_all(read_npy::<i16>(b)?),
    |b| display_all(read_npy::<i8>(b)?),
    |b| display_all(read_npy::<u64>(b)?),
    |b| display_all(read_npy::<u32>(b)?),
    |b| display_all(read_npy::<u16>(b)?),
    |b| display_all(read_npy::<u8>(b)?),
    |b| Ok(read_npy::<f64>(b)?.iter().map(|v| format!("{:?}", v)).collect()),
    |b| Ok(read_npy::<f32>(b)?.iter().map(|v| format!("{:?}", v)).collect()),
    |b| Ok(read_npy::<bool>(b)?.into_iter().map(python_bool).collect()),
];

impl ArtifactFormat<Vec<String>> for NpyFormat {
    fn name(&self) -> &'static str {
        "npy"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let npy = npyz::NpyFile::new(bytes).context("not an NPY file")?;
        let count = match npy.shape() {
            &[n] | &[n, 1] => n,
            other => bail!("expected a one-dimensional feature array, got shape {:?}", other),
        };
        // every element takes at least one byte, so a larger count is a corrupt header
        ensure!(
            count <= bytes.len() as u64,
            "NPY header claims {} elements but the file holds {} bytes",
            count,
            bytes.len()
        );

        NPY_READERS
            .iter()
            .find_map(|read| read(bytes).ok())
            .ok_or_else(|| anyhow!("unsupported NPY element type {:?}", npy.dtype()))
    }
}

fn read_npy<T: npyz::Deserialize>(bytes: &[u8]) -> std::io::Result<Vec<T>> {
    npyz::NpyFile::new(bytes)?.into_vec()
}

fn display_all<T: ToString>(values: Vec<T>) -> anyhow::Result<Vec<String>> {
    Ok(values.iter().map(ToString::to_string).collect())
}

fn python_bool(v: bool) -> String {
    let name = if v { "True" } else { "False" };
    name.to_string()
}

fn trim_nul(s: String) -> String {
    s.trim_end_matches('\0').to_string()
}

fn byte_string(raw: Vec<u8>) -> anyhow::Result<String> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8(raw[..end].to_vec()).context("feature name is not UTF-8")
}

/// JSON array of scalars
pub struct JsonListFormat;

impl ArtifactFormat<Vec<String>> for JsonListFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let values: Vec<serde_json::Value> =
            serde_json::from_slice(bytes).context("not a JSON array")?;
        Ok(values
            .into_iter()
            .map(|v| match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(true) => "True".to_string(),
                serde_json::Value::Bool(false) => "False".to_string(),
                serde_json::Value::Null => "None".to_string(),
                other => other.to_string(),
            })
            .collect())
    }
}

/// One feature name per line
pub struct TextListFormat;

impl ArtifactFormat<Vec<String>> for TextListFormat {
    fn name(&self) -> &'static str {
        "text"
    }

    fn decode(&self, _path: &Path, bytes: &[u8]) -> anyhow::Result<Vec<String>> {
        let text = std::str::from_utf8(bytes).context("not UTF-8 text")?;
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictError;
    use std::io::Write;

    const NPY_MAGIC: &[u8] = b"\x93NUMPY";

    /// Build a version 1.0 `.npy` payload with the given dtype, shape and data
    fn npy_bytes(descr: &str, shape: &str, data: &[u8]) -> Vec<u8> {
        let mut header = format!(
            "{{'descr': '{}', 'fortran_order': False, 'shape': {}, }}",
            descr, shape
        );
        // Pad so the data starts on a 64-byte boundary, newline terminated
        let unpadded = NPY_MAGIC.len() + 2 + 2 + header.len() + 1;
        header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
        header.push('\n');

        let mut out = NPY_MAGIC.to_vec();
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        out.extend_from_slice(data);
        out
    }

    fn utf32(names: &[&str], width: usize) -> Vec<u8> {
        let mut data = Vec::new();
        for name in names {
            let mut chars: Vec<u32> = name.chars().map(|c| c as u32).collect();
            chars.resize(width, 0);
            for c in chars {
                data.extend_from_slice(&c.to_le_bytes());
            }
        }
        data
    }

    fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file
    }

    #[test]
    fn test_npy_unicode_array() {
        let bytes = npy_bytes("<U9", "(3,)", &utf32(&["LIMIT_BAL", "AGE", "PAY_0"], 9));
        let names = NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap();
        assert_eq!(names, vec!["LIMIT_BAL", "AGE", "PAY_0"]);
    }

    #[test]
    fn test_npy_column_vector_shape() {
        let bytes = npy_bytes("<U1", "(2, 1)", &utf32(&["a", "b"], 1));
        let names = NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_npy_numbers_coerced_to_strings() {
        let mut data = Vec::new();
        data.extend_from_slice(&7i64.to_le_bytes());
        data.extend_from_slice(&42i64.to_le_bytes());
        let bytes = npy_bytes("<i8", "(2,)", &data);
        assert_eq!(
            NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap(),
            vec!["7", "42"]
        );

        let bytes = npy_bytes("<f8", "(1,)", &1.0f64.to_le_bytes());
        assert_eq!(NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap(), vec!["1.0"]);
    }

    #[test]
    fn test_npy_byte_strings() {
        let bytes = npy_bytes("|S3", "(2,)", b"ab\0cde");
        let names = NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap();
        assert_eq!(names, vec!["ab", "cde"]);
    }

    #[test]
    fn test_npy_object_array_rejected() {
        let bytes = npy_bytes("|O", "(2,)", &[0u8; 16]);
        assert!(NpyFormat.decode(Path::new("f.npy"), &bytes).is_err());
    }

    #[test]
    fn test_npy_oversized_shape_is_an_error() {
        let bytes = npy_bytes("<U1", "(4611686018427387904,)", &utf32(&["a"], 1));
        let err = NpyFormat.decode(Path::new("f.npy"), &bytes).unwrap_err();
        assert!(err.to_string().contains("4611686018427387904"));
    }

    #[test]
    fn test_npy_matrix_shape_rejected() {
        let bytes = npy_bytes("<U1", "(2, 2)", &utf32(&["a", "b", "c", "d"], 1));
        assert!(NpyFormat.decode(Path::new("f.npy"), &bytes).is_err());
    }

    #[test]
    fn test_corrupt_npy_falls_through_to_deserialize_error() {
        let bytes = npy_bytes("<U1", "(4611686018427387904,)", &utf32(&["a"], 1));
        // the magic byte is not UTF-8, so the JSON and text readers fail too
        let file = write_temp(&bytes);
        let err = load_features(file.path()).unwrap_err();
        assert!(matches!(err, PredictError::Deserialize { .. }));
    }

    #[test]
    fn test_json_list_coerces_elements() {
        let names = JsonListFormat
            .decode(Path::new("f.json"), br#"["a", 3, 1.5, true]"#)
            .unwrap();
        assert_eq!(names, vec!["a", "3", "1.5", "True"]);
    }

    #[test]
    fn test_load_features_falls_back_to_text() {
        let file = write_temp(b"amount\r\ncountry\n\nage\n");
        let features = load_features(file.path()).unwrap();
        assert_eq!(features.names(), &["amount", "country", "age"]);
    }

    #[test]
    fn test_load_features_from_npy_file() {
        let file = write_temp(&npy_bytes("<U1", "(2,)", &utf32(&["a", "b"], 1)));
        let features = load_features(file.path()).unwrap();
        assert_eq!(features.names(), &["a", "b"]);
    }

    #[test]
    fn test_duplicate_features_rejected() {
        let file = write_temp(br#"["a", "b", "a"]"#);
        let err = load_features(file.path()).unwrap_err();
        assert!(matches!(
            err,
            PredictError::Validation(ValidationError::DuplicateFeature(ref name)) if name == "a"
        ));
    }

    #[test]
    fn test_empty_feature_list_rejected() {
        assert_eq!(
            FeatureList::new(Vec::new()).unwrap_err(),
            ValidationError::EmptyFeatureList
        );
    }
}
