use std::env;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use stratsync_core::{MissingMagnitudePolicy, NewStrategy, DEFAULT_SHEET};

pub const POLICY_ENV: &str = "STRATSYNC_MISSING_MAGNITUDE";

/// Settings read from the environment; explicit flags and config files win.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub missing_magnitude: MissingMagnitudePolicy,
}

impl SyncSettings {
    pub fn from_env() -> Result<Self> {
        let missing_magnitude = match env::var(POLICY_ENV) {
            Ok(raw) => raw
                .parse::<MissingMagnitudePolicy>()
                .map_err(|err| anyhow!("{POLICY_ENV}: {err}"))?,
            Err(_) => MissingMagnitudePolicy::default(),
        };
        Ok(Self { missing_magnitude })
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    pub group: String,
    pub suffix: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub update: bool,
}

impl StrategyConfig {
    pub fn to_request(&self) -> NewStrategy {
        NewStrategy {
            group: self.group.clone(),
            description: self.description.clone(),
            suffix: self.suffix.clone(),
            custom_id: self.id,
            update: self.update,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    pub table: String,
    /// Worksheet to read when `table` is a workbook.
    #[serde(default = "default_sheet")]
    pub sheet: String,
    pub yaml_dir: String,
    #[serde(default = "default_registry")]
    pub registry: String,
    #[serde(default = "default_mapping")]
    pub mapping: String,
    #[serde(default)]
    pub missing_magnitude: Option<MissingMagnitudePolicy>,
    #[serde(default = "default_filter_by_table")]
    pub filter_by_table: bool,
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

impl RunConfig {
    /// YAML by default; TOML when the file ends in `.toml`.
    pub fn load(path: &str) -> Result<Self> {
        let raw =
            fs::read_to_string(path).with_context(|| format!("failed to read config {path}"))?;
        let is_toml = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            toml::from_str(&raw).context("invalid stratsync config")
        } else {
            serde_yaml::from_str(&raw).context("invalid stratsync config")
        }
    }
}

fn default_sheet() -> String {
    DEFAULT_SHEET.to_string()
}

fn default_registry() -> String {
    "strategy_definitions.csv".to_string()
}

fn default_mapping() -> String {
    "strategy_mapping.yaml".to_string()
}

fn default_filter_by_table() -> bool {
    true
}
