use std::path::Path;

use anyhow::{bail, Result};
use stratsync_core::{
    DocumentStore, MissingMagnitudePolicy, ScaleOutcome, ScalingEngine, ScalingReport,
    ScalingTable,
};
use tracing::info;

use crate::config::SyncSettings;

pub fn run(
    table: String,
    yaml_dir: String,
    sheet: String,
    missing_magnitude: Option<MissingMagnitudePolicy>,
    json: bool,
) -> Result<()> {
    let settings = SyncSettings::from_env()?;
    let policy = missing_magnitude.unwrap_or(settings.missing_magnitude);
    let (_, report) = scale_table(Path::new(&table), &sheet, Path::new(&yaml_dir), policy)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

/// Loads the table leniently and scales it into `yaml_dir`. Per-document
/// failures end up in the report; only an unusable directory is an error.
pub fn scale_table(
    table: &Path,
    sheet: &str,
    yaml_dir: &Path,
    policy: MissingMagnitudePolicy,
) -> Result<(ScalingTable, ScalingReport)> {
    if !yaml_dir.is_dir() {
        bail!("yaml directory {} does not exist", yaml_dir.display());
    }
    let table = ScalingTable::load_or_empty(table, sheet);
    info!(
        rows = table.rows().len(),
        strategies = table.strategy_columns().len(),
        %policy,
        "scaling transformation documents"
    );
    let engine = ScalingEngine::new(DocumentStore::new(yaml_dir), policy);
    let report = engine.process(&table);
    Ok((table, report))
}

pub fn print_summary(report: &ScalingReport) {
    println!(
        "[stratsync] wrote {} documents, skipped {}, failed {}",
        report.written().count(),
        report.skipped().count(),
        report.failures.len()
    );
    for result in &report.results {
        if let ScaleOutcome::Skipped { reason } = &result.outcome {
            println!(
                "[stratsync] {} for {} was not written ({reason}); check it manually",
                result.yaml_name, result.column
            );
        }
    }
    for failure in &report.failures {
        match &failure.column {
            Some(column) => println!(
                "[stratsync] {} for {} failed: {}",
                failure.yaml_name, column, failure.reason
            ),
            None => println!("[stratsync] {} failed: {}", failure.yaml_name, failure.reason),
        }
    }
}
