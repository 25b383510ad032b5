use std::path::Path;

use anyhow::{bail, Result};
use stratsync_core::{MissingMagnitudePolicy, NewStrategy, ScalingTable};
use tracing::info;

use crate::config::{RunConfig, SyncSettings};
use crate::{scale, strategy};

pub fn run_from_config(path: &str) -> Result<()> {
    let cfg = RunConfig::load(path)?;
    let settings = SyncSettings::from_env()?;
    run_pipeline(
        cfg,
        settings,
        |table, sheet, yaml_dir, policy| {
            let (table, report) = scale::scale_table(table, sheet, yaml_dir, policy)?;
            scale::print_summary(&report);
            Ok(table)
        },
        |cfg, table, requests| {
            let builder = strategy::open_builder(&cfg.mapping, &cfg.yaml_dir, table)?;
            let mut registry = strategy::open_registry(&cfg.registry)?;
            Ok(strategy::apply_all(&builder, &mut registry, requests))
        },
    )
}

/// Scales first, then applies the configured strategies against the documents
/// the scaling step produced. When specifications are filtered by the table,
/// an empty table stops the run before the registry is touched.
fn run_pipeline<FScale, FRegistry>(
    cfg: RunConfig,
    settings: SyncSettings,
    scale_fn: FScale,
    registry_fn: FRegistry,
) -> Result<()>
where
    FScale: Fn(&Path, &str, &Path, MissingMagnitudePolicy) -> Result<ScalingTable>,
    FRegistry: Fn(&RunConfig, Option<&ScalingTable>, &[NewStrategy]) -> Result<usize>,
{
    let policy = cfg.missing_magnitude.unwrap_or(settings.missing_magnitude);
    info!(table = %cfg.table, yaml_dir = %cfg.yaml_dir, "scaling step");
    let table = scale_fn(
        Path::new(&cfg.table),
        &cfg.sheet,
        Path::new(&cfg.yaml_dir),
        policy,
    )?;
    if cfg.strategies.is_empty() {
        info!("no strategies configured; registry left untouched");
        return Ok(());
    }
    if cfg.filter_by_table && table.is_empty() {
        bail!(
            "scaling table {} is empty or could not be loaded; registry left untouched",
            cfg.table
        );
    }
    let requests = cfg
        .strategies
        .iter()
        .map(|strategy| strategy.to_request())
        .collect::<Vec<_>>();
    let filter = cfg.filter_by_table.then_some(&table);
    info!(registry = %cfg.registry, strategies = requests.len(), "registry step");
    let failed = registry_fn(&cfg, filter, &requests)?;
    if failed > 0 {
        bail!("{failed} of {} strategy operations failed", requests.len());
    }
    Ok(())
}
