use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::error::{Result, SyncError};

/// Inclusive range of strategy ids reserved for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdRange {
    pub min: i64,
    pub max: i64,
}

impl IdRange {
    pub fn contains(&self, id: i64) -> bool {
        (self.min..=self.max).contains(&id)
    }
}

impl FromStr for IdRange {
    type Err = SyncError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || SyncError::InvalidRange(raw.to_string());
        let (min, max) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let min = min.trim().parse::<i64>().map_err(|_| invalid())?;
        let max = max.trim().parse::<i64>().map_err(|_| invalid())?;
        if min > max {
            return Err(invalid());
        }
        Ok(Self { min, max })
    }
}

impl fmt::Display for IdRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min, self.max)
    }
}

#[derive(Debug, Deserialize)]
struct MappingFile {
    #[serde(default)]
    strategy_groups: BTreeMap<String, serde_yaml::Value>,
}

/// Group label to id range, read from the `strategy_groups` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMapping {
    groups: BTreeMap<String, IdRange>,
}

impl GroupMapping {
    /// A missing file yields an empty mapping; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "strategy group mapping not found");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let file: MappingFile = serde_yaml::from_str(raw)?;
        let mut groups = BTreeMap::new();
        for (label, value) in file.strategy_groups {
            let text = match value {
                serde_yaml::Value::String(s) => s,
                other => return Err(SyncError::InvalidRange(format!("{label}: {other:?}"))),
            };
            groups.insert(label, text.parse::<IdRange>()?);
        }
        Ok(Self { groups })
    }

    pub fn from_ranges<I, S>(ranges: I) -> Self
    where
        I: IntoIterator<Item = (S, IdRange)>,
        S: Into<String>,
    {
        Self {
            groups: ranges
                .into_iter()
                .map(|(label, range)| (label.into(), range))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = (&str, IdRange)> {
        self.groups.iter().map(|(label, range)| (label.as_str(), *range))
    }

    /// Exact label first, then a case-insensitive match.
    pub fn range_for(&self, group: &str) -> Result<IdRange> {
        if let Some(range) = self.groups.get(group) {
            return Ok(*range);
        }
        self.groups
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(group))
            .map(|(_, range)| *range)
            .ok_or_else(|| SyncError::UnknownGroup(group.to_string()))
    }
}
