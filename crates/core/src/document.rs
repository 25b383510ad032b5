use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use crate::error::{Result, SyncError};

const IDENTIFIERS: &str = "identifiers";
const PARAMETERS: &str = "parameters";
const MAGNITUDE: &str = "magnitude";
const TRANSFORMATION_CODE: &str = "transformation_code";
const TRANSFORMATION_NAME: &str = "transformation_name";
pub const DOCUMENT_EXTENSION: &str = "yaml";

/// Where a document stands with respect to scaling.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MagnitudeSlot {
    MissingParameters,
    MissingMagnitude,
    Present(f64),
}

/// A transformation configuration document. Keys the tool does not touch are
/// carried through unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformationDocument {
    root: Mapping,
    path: PathBuf,
}

impl TransformationDocument {
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::MissingFile(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw, path)
    }

    pub fn parse(raw: &str, path: &Path) -> Result<Self> {
        let value: Value = serde_yaml::from_str(raw)?;
        match value {
            Value::Mapping(root) => Ok(Self {
                root,
                path: path.to_path_buf(),
            }),
            _ => Err(SyncError::malformed(path, "top level is not a mapping")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(&self.root)?;
        fs::write(path, raw)?;
        Ok(())
    }

    pub fn transformation_code(&self) -> Result<String> {
        self.identifier(TRANSFORMATION_CODE)
    }

    pub fn transformation_name(&self) -> Result<String> {
        self.identifier(TRANSFORMATION_NAME)
    }

    fn identifier(&self, key: &str) -> Result<String> {
        let value = self
            .section(IDENTIFIERS)
            .and_then(|ids| ids.get(key))
            .ok_or_else(|| SyncError::malformed(&self.path, format!("missing identifiers.{key}")))?;
        scalar_to_string(value)
            .ok_or_else(|| SyncError::malformed(&self.path, format!("identifiers.{key} is not a scalar")))
    }

    /// Overwrites `identifiers.transformation_code` and `identifiers.transformation_name`,
    /// creating the section if the document lacks one.
    pub fn set_identifiers(&mut self, code: &str, name: &str) -> Result<()> {
        let ids = self.section_mut(IDENTIFIERS)?;
        ids.insert(key(TRANSFORMATION_CODE), Value::String(code.to_string()));
        ids.insert(key(TRANSFORMATION_NAME), Value::String(name.to_string()));
        Ok(())
    }

    pub fn magnitude(&self) -> Result<MagnitudeSlot> {
        let Some(params) = self.section(PARAMETERS) else {
            return Ok(MagnitudeSlot::MissingParameters);
        };
        let Some(value) = params.get(MAGNITUDE) else {
            return Ok(MagnitudeSlot::MissingMagnitude);
        };
        coerce_f64(value).map(MagnitudeSlot::Present)
    }

    pub fn set_magnitude(&mut self, magnitude: f64) -> Result<()> {
        let params = self.section_mut(PARAMETERS)?;
        params.insert(key(MAGNITUDE), Value::from(magnitude));
        Ok(())
    }

    fn section(&self, name: &str) -> Option<&Mapping> {
        self.root.get(name).and_then(Value::as_mapping)
    }

    fn section_mut(&mut self, name: &str) -> Result<&mut Mapping> {
        let entry = self.root.entry(key(name)).or_insert(Value::Null);
        if entry.is_null() {
            *entry = Value::Mapping(Mapping::new());
        }
        match entry {
            Value::Mapping(map) => Ok(map),
            _ => Err(SyncError::malformed(&self.path, format!("{name} is not a mapping"))),
        }
    }
}

fn key(name: &str) -> Value {
    Value::String(name.to_string())
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_f64(value: &Value) -> Result<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| SyncError::NonNumeric {
            what: "magnitude",
            value: scalar_to_string(value).unwrap_or_else(|| format!("{value:?}")),
        })
}

/// A directory of transformation documents addressed by file name.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    dir: PathBuf,
}

impl DocumentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).is_file()
    }

    pub fn read(&self, name: &str) -> Result<TransformationDocument> {
        TransformationDocument::from_path(&self.path_for(name))
    }

    pub fn write(&self, name: &str, doc: &TransformationDocument) -> Result<PathBuf> {
        let path = self.path_for(name);
        doc.write_to(&path)?;
        Ok(path)
    }

    /// File names ending in `{suffix}.yaml`, sorted lexicographically.
    pub fn list_with_suffix(&self, suffix: &str) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Err(SyncError::MissingFile(self.dir.clone()));
        }
        let wanted = format!("{suffix}.{DOCUMENT_EXTENSION}");
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.ends_with(&wanted) {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DOC: &str = "identifiers:\n  transformation_code: T1\n  transformation_name: Test\nparameters:\n  magnitude: 5\n  categories: [a, b]\ndescription: keep me\n";

    fn doc(raw: &str) -> TransformationDocument {
        TransformationDocument::parse(raw, Path::new("t1.yaml")).unwrap()
    }

    #[test]
    fn magnitude_slots_cover_all_shapes() {
        assert_eq!(doc(DOC).magnitude().unwrap(), MagnitudeSlot::Present(5.0));
        assert_eq!(
            doc("identifiers: {transformation_code: T}\n").magnitude().unwrap(),
            MagnitudeSlot::MissingParameters
        );
        assert_eq!(
            doc("parameters:\n  other: 1\n").magnitude().unwrap(),
            MagnitudeSlot::MissingMagnitude
        );
        assert_eq!(
            doc("parameters:\n  magnitude: '0.25'\n").magnitude().unwrap(),
            MagnitudeSlot::Present(0.25)
        );
    }

    #[test]
    fn non_numeric_magnitude_is_an_error() {
        let err = doc("parameters:\n  magnitude: high\n").magnitude().unwrap_err();
        assert!(matches!(err, SyncError::NonNumeric { what: "magnitude", .. }));
    }

    #[test]
    fn set_identifiers_preserves_unrelated_keys() {
        let mut document = doc(DOC);
        document.set_identifiers("T1_STRATEGY_A", "Scaled").unwrap();
        document.set_magnitude(10.0).unwrap();
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.yaml");
        document.write_to(&out).unwrap();

        let reread = TransformationDocument::from_path(&out).unwrap();
        assert_eq!(reread.transformation_code().unwrap(), "T1_STRATEGY_A");
        assert_eq!(reread.transformation_name().unwrap(), "Scaled");
        assert_eq!(reread.magnitude().unwrap(), MagnitudeSlot::Present(10.0));
        let raw = fs::read_to_string(&out).unwrap();
        assert!(raw.contains("description: keep me"));
        assert!(raw.contains("categories"));
    }

    #[test]
    fn top_level_sequence_is_malformed() {
        let err = TransformationDocument::parse("- a\n- b\n", Path::new("x.yaml")).unwrap_err();
        assert!(matches!(err, SyncError::MalformedDocument { .. }));
    }

    #[test]
    fn list_with_suffix_is_sorted() {
        let dir = tempdir().unwrap();
        for name in ["b_strategy_a.yaml", "a_strategy_a.yaml", "a_strategy_b.yaml", "a.yaml"] {
            fs::write(dir.path().join(name), DOC).unwrap();
        }
        let store = DocumentStore::new(dir.path());
        assert_eq!(
            store.list_with_suffix("strategy_a").unwrap(),
            vec!["a_strategy_a.yaml", "b_strategy_a.yaml"]
        );
        assert!(store.exists("a.yaml"));
        assert!(!store.exists("missing.yaml"));
    }
}
