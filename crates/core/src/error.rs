use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::Error),
    #[error("file not found: {0:?}")]
    MissingFile(PathBuf),
    #[error("malformed document {path:?}: {reason}")]
    MalformedDocument { path: PathBuf, reason: String },
    #[error("worksheet {sheet:?} not found in {path:?}")]
    MissingSheet { path: PathBuf, sheet: String },
    #[error("cannot write a table to {0:?}; use a .csv or .tsv path")]
    UnsupportedOutput(PathBuf),
    #[error("missing column {column:?} in {path:?}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("{what} is not numeric: {value:?}")]
    NonNumeric { what: &'static str, value: String },
    #[error("unknown strategy group: {0}")]
    UnknownGroup(String),
    #[error("invalid id range {0:?}, expected \"min-max\"")]
    InvalidRange(String),
    #[error("exceeded id range for {group} (max {max})")]
    RangeExceeded { group: String, max: i64 },
    #[error("strategy_id {id} is outside the range {min}-{max} of group {group}")]
    IdOutOfRange {
        group: String,
        id: i64,
        min: i64,
        max: i64,
    },
    #[error("strategy_id {0} already exists")]
    DuplicateId(i64),
    #[error("strategy_code {0} already exists")]
    DuplicateCode(String),
    #[error("strategy_id {0} does not exist")]
    UnknownId(i64),
    #[error("a custom strategy_id is required to update a strategy")]
    MissingCustomId,
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedDocument {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
