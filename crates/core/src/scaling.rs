use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::document::{DocumentStore, MagnitudeSlot, DOCUMENT_EXTENSION};
use crate::error::Result;
use crate::table::{derived_transformation_code, ScalarCell, ScalingRow, ScalingTable};

/// What to do with a document whose `parameters` section has no `magnitude`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingMagnitudePolicy {
    /// Write the derived document with only its identifiers changed.
    #[default]
    #[serde(alias = "copy")]
    CopyThrough,
    /// Write nothing and report the pair for manual review.
    Skip,
}

impl FromStr for MissingMagnitudePolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "copy" | "copy-through" | "copy_through" => Ok(Self::CopyThrough),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown missing-magnitude policy {other:?} (expected copy or skip)")),
        }
    }
}

impl fmt::Display for MissingMagnitudePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CopyThrough => f.write_str("copy-through"),
            Self::Skip => f.write_str("skip"),
        }
    }
}

/// `t1.yaml` scaled for `strategy_a` is written as `t1_strategy_a.yaml`.
pub fn derived_document_name(yaml_name: &str, column: &str) -> String {
    let stem = Path::new(yaml_name).with_extension("");
    format!("{}_{}.{}", stem.to_string_lossy(), column, DOCUMENT_EXTENSION)
}

pub fn derived_transformation_name(scalar: f64, subsector: &str, name: &str) -> String {
    format!("Scaled Default Max Parameters by {scalar:?} - {subsector}: {name}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScaleOutcome {
    Scaled {
        output: PathBuf,
        original: f64,
        scaled: f64,
    },
    CopiedThrough {
        output: PathBuf,
        reason: &'static str,
    },
    Skipped {
        reason: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairResult {
    pub yaml_name: String,
    pub column: String,
    #[serde(flatten)]
    pub outcome: ScaleOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairFailure {
    pub yaml_name: String,
    /// `None` when the whole row failed before any column was looked at.
    pub column: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScalingReport {
    pub results: Vec<PairResult>,
    pub failures: Vec<PairFailure>,
}

impl ScalingReport {
    pub fn written(&self) -> impl Iterator<Item = &Path> {
        self.results.iter().filter_map(|result| match &result.outcome {
            ScaleOutcome::Scaled { output, .. } | ScaleOutcome::CopiedThrough { output, .. } => {
                Some(output.as_path())
            }
            ScaleOutcome::Skipped { .. } => None,
        })
    }

    pub fn skipped(&self) -> impl Iterator<Item = &PairResult> {
        self.results
            .iter()
            .filter(|result| matches!(result.outcome, ScaleOutcome::Skipped { .. }))
    }

    fn fail(&mut self, row: &ScalingRow, column: Option<&str>, reason: impl fmt::Display) {
        self.failures.push(PairFailure {
            yaml_name: row.yaml_name.clone(),
            column: column.map(str::to_string),
            reason: reason.to_string(),
        });
    }
}

pub struct ScalingEngine {
    store: DocumentStore,
    policy: MissingMagnitudePolicy,
}

impl ScalingEngine {
    pub fn new(store: DocumentStore, policy: MissingMagnitudePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &DocumentStore {
        &self.store
    }

    pub fn policy(&self) -> MissingMagnitudePolicy {
        self.policy
    }

    /// Scales every (row, strategy column) pair with a present scalar. Failures
    /// are recorded in the report and never stop the remaining pairs.
    pub fn process(&self, table: &ScalingTable) -> ScalingReport {
        let mut report = ScalingReport::default();
        if table.is_empty() {
            warn!("no scaling rows available to process");
            return report;
        }
        for row in table.rows() {
            if !self.store.exists(&row.yaml_name) {
                warn!(
                    yaml = %row.yaml_name,
                    dir = %self.store.dir().display(),
                    "transformation document not found"
                );
                report.fail(row, None, "document not found");
                continue;
            }
            for (column, cell) in table.strategy_columns().iter().zip(&row.scalars) {
                let scalar = match cell {
                    ScalarCell::Absent => continue,
                    ScalarCell::Value(value) => *value,
                    ScalarCell::Invalid(raw) => {
                        warn!(yaml = %row.yaml_name, column = %column, value = %raw, "scalar is not numeric");
                        report.fail(row, Some(column.as_str()), format!("scalar is not numeric: {raw:?}"));
                        continue;
                    }
                };
                match self.scale_one(row, column, scalar) {
                    Ok(outcome) => report.results.push(PairResult {
                        yaml_name: row.yaml_name.clone(),
                        column: column.clone(),
                        outcome,
                    }),
                    Err(err) => {
                        error!(yaml = %row.yaml_name, column = %column, error = %err, "failed to scale document");
                        report.fail(row, Some(column.as_str()), err);
                    }
                }
            }
        }
        info!(
            written = report.written().count(),
            skipped = report.skipped().count(),
            failed = report.failures.len(),
            "scaling finished"
        );
        report
    }

    pub fn scale_one(&self, row: &ScalingRow, column: &str, scalar: f64) -> Result<ScaleOutcome> {
        let mut doc = self.store.read(&row.yaml_name)?;
        let slot = doc.magnitude()?;
        let scaled = match slot {
            MagnitudeSlot::Present(magnitude) => {
                let scaled = scalar * magnitude;
                doc.set_magnitude(scaled)?;
                Some((magnitude, scaled))
            }
            MagnitudeSlot::MissingParameters => {
                info!(yaml = %row.yaml_name, column, "no parameters section; copying through");
                None
            }
            MagnitudeSlot::MissingMagnitude => match self.policy {
                MissingMagnitudePolicy::CopyThrough => {
                    info!(yaml = %row.yaml_name, column, "no magnitude parameter; copying through");
                    None
                }
                MissingMagnitudePolicy::Skip => {
                    warn!(yaml = %row.yaml_name, column, "no magnitude parameter; check it manually");
                    return Ok(ScaleOutcome::Skipped {
                        reason: "missing magnitude",
                    });
                }
            },
        };
        doc.set_identifiers(
            &derived_transformation_code(&row.code, column),
            &derived_transformation_name(scalar, &row.subsector, &row.name),
        )?;
        let output = self
            .store
            .write(&derived_document_name(&row.yaml_name, column), &doc)?;
        debug!(output = %output.display(), "wrote derived document");
        Ok(match scaled {
            Some((original, scaled)) => ScaleOutcome::Scaled {
                output,
                original,
                scaled,
            },
            None if slot == MagnitudeSlot::MissingParameters => ScaleOutcome::CopiedThrough {
                output,
                reason: "missing parameters",
            },
            None => ScaleOutcome::CopiedThrough {
                output,
                reason: "missing magnitude",
            },
        })
    }
}
