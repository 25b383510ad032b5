use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use tracing::{error, info};

use crate::error::{Result, SyncError};

/// Placeholder for a key the run configuration does not set.
pub const NOT_FOUND: &str = "Not found";

#[derive(Debug, Default, Deserialize)]
struct RegionFile {
    #[serde(default)]
    country_name: Option<Value>,
    #[serde(default)]
    ssp_input_file_name: Option<Value>,
    #[serde(default)]
    ssp_transformation_cw: Option<Value>,
}

/// Country and SSP inputs named by a run-level YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionConfig {
    pub country_name: String,
    pub ssp_input_file_name: String,
    pub ssp_transformation_cw: String,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            country_name: NOT_FOUND.to_string(),
            ssp_input_file_name: NOT_FOUND.to_string(),
            ssp_transformation_cw: NOT_FOUND.to_string(),
        }
    }
}

impl RegionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SyncError::MissingFile(path.to_path_buf()));
        }
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Keys that are absent, null or not scalars read as [`NOT_FOUND`].
    pub fn parse(raw: &str) -> Result<Self> {
        let file = if raw.trim().is_empty() {
            RegionFile::default()
        } else {
            serde_yaml::from_str::<RegionFile>(raw)?
        };
        Ok(Self {
            country_name: scalar_text(file.country_name),
            ssp_input_file_name: scalar_text(file.ssp_input_file_name),
            ssp_transformation_cw: scalar_text(file.ssp_transformation_cw),
        })
    }

    /// Logs and returns `None` when the file is missing or unparseable.
    pub fn load_logged(path: &Path) -> Option<Self> {
        match Self::load(path) {
            Ok(config) => {
                info!(
                    path = %path.display(),
                    country_name = %config.country_name,
                    ssp_input_file_name = %config.ssp_input_file_name,
                    ssp_transformation_cw = %config.ssp_transformation_cw,
                    "loaded region config"
                );
                Some(config)
            }
            Err(err) => {
                error!(path = %path.display(), error = %err, "failed to load region config");
                None
            }
        }
    }
}

fn scalar_text(value: Option<Value>) -> String {
    match value {
        Some(Value::String(text)) => text,
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::Bool(flag)) => flag.to_string(),
        _ => NOT_FOUND.to_string(),
    }
}
