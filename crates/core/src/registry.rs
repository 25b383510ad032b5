use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use crate::error::{Result, SyncError};

pub const REGISTRY_HEADER: [&str; 5] = [
    "strategy_id",
    "strategy_code",
    "strategy",
    "description",
    "transformation_specification",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyRow {
    #[serde(default, deserialize_with = "lenient_id")]
    pub strategy_id: i64,
    #[serde(default)]
    pub strategy_code: String,
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub transformation_specification: String,
}

impl StrategyRow {
    fn field(&self, column: &str) -> Option<String> {
        match column {
            "strategy_id" => Some(self.strategy_id.to_string()),
            "strategy_code" => Some(self.strategy_code.clone()),
            "strategy" => Some(self.strategy.clone()),
            "description" => Some(self.description.clone()),
            "transformation_specification" => Some(self.transformation_specification.clone()),
            _ => None,
        }
    }
}

fn canonical_headers() -> Vec<String> {
    REGISTRY_HEADER.iter().map(|column| column.to_string()).collect()
}

/// Ids that do not parse as numbers are read as 0.
fn lenient_id<'de, D>(deserializer: D) -> std::result::Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
    let trimmed = raw.trim();
    Ok(trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| {
            trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(|v| v.trunc() as i64)
        })
        .unwrap_or(0))
}

/// The strategy registry CSV, held in memory between explicit
/// [`reload`](StrategyRegistry::reload) and [`flush`](StrategyRegistry::flush) calls.
///
/// Columns other than [`REGISTRY_HEADER`] are carried through untouched, in
/// their original position.
#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    path: PathBuf,
    headers: Vec<String>,
    rows: Vec<StrategyRow>,
    /// Per row, one cell for each entry of `extra_columns()`.
    extras: Vec<Vec<String>>,
}

impl StrategyRegistry {
    /// Loads the registry, writing an empty one with the canonical header when
    /// the file does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut registry = Self {
            path: path.into(),
            headers: canonical_headers(),
            rows: Vec::new(),
            extras: Vec::new(),
        };
        if registry.path.exists() {
            registry.reload()?;
        } else {
            info!(path = %registry.path.display(), "registry not found; creating an empty one");
            registry.flush()?;
        }
        Ok(registry)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replaces the in-memory rows with the file's current contents.
    pub fn reload(&mut self) -> Result<()> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "registry file absent on reload");
            self.headers = canonical_headers();
            self.rows.clear();
            self.extras.clear();
            return Ok(());
        }
        let mut reader = ReaderBuilder::new().from_path(&self.path)?;
        let header_record = reader.headers()?.clone();
        let extra_idx = header_record
            .iter()
            .enumerate()
            .filter(|(_, header)| !REGISTRY_HEADER.contains(header))
            .map(|(idx, _)| idx)
            .collect::<Vec<_>>();
        let mut rows = Vec::new();
        let mut extras = Vec::new();
        for record in reader.records() {
            let record = record?;
            rows.push(record.deserialize::<StrategyRow>(Some(&header_record))?);
            extras.push(
                extra_idx
                    .iter()
                    .map(|&idx| record.get(idx).unwrap_or_default().to_string())
                    .collect(),
            );
        }
        let mut headers = header_record
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        for column in REGISTRY_HEADER {
            if !headers.iter().any(|header| header == column) {
                headers.push(column.to_string());
            }
        }
        debug!(
            path = %self.path.display(),
            rows = rows.len(),
            extra_columns = extra_idx.len(),
            "registry reloaded"
        );
        self.headers = headers;
        self.rows = rows;
        self.extras = extras;
        Ok(())
    }

    /// Rewrites the whole registry file.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let extra_columns = self.extra_columns();
        let mut writer = WriterBuilder::new().from_path(&self.path)?;
        writer.write_record(&self.headers)?;
        for (idx, row) in self.rows.iter().enumerate() {
            let extras = self.extras.get(idx);
            let record = self
                .headers
                .iter()
                .map(|header| {
                    row.field(header).unwrap_or_else(|| {
                        extra_columns
                            .iter()
                            .position(|column| *column == header.as_str())
                            .and_then(|pos| extras.and_then(|cells| cells.get(pos)))
                            .cloned()
                            .unwrap_or_default()
                    })
                })
                .collect::<Vec<_>>();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        debug!(path = %self.path.display(), rows = self.rows.len(), "registry saved");
        Ok(())
    }

    /// Header columns the registry does not interpret, in file order.
    pub fn extra_columns(&self) -> Vec<&str> {
        self.headers
            .iter()
            .map(String::as_str)
            .filter(|header| !REGISTRY_HEADER.contains(header))
            .collect()
    }

    pub fn rows(&self) -> &[StrategyRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_id(&self, id: i64) -> bool {
        self.rows.iter().any(|row| row.strategy_id == id)
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.rows.iter().any(|row| row.strategy_code == code)
    }

    pub fn find_by_id(&self, id: i64) -> Option<&StrategyRow> {
        self.rows.iter().find(|row| row.strategy_id == id)
    }

    pub fn max_id_with_prefix(&self, prefix: &str) -> Option<i64> {
        self.rows
            .iter()
            .filter(|row| row.strategy_code.starts_with(prefix))
            .map(|row| row.strategy_id)
            .max()
    }

    pub(crate) fn push(&mut self, row: StrategyRow) {
        self.rows.push(row);
        self.extras.push(Vec::new());
    }

    pub(crate) fn set_specification(&mut self, id: i64, specification: String) -> Result<()> {
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.strategy_id == id)
            .ok_or(SyncError::UnknownId(id))?;
        row.transformation_specification = specification;
        Ok(())
    }
}
