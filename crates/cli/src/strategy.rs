use std::path::Path;

use anyhow::{Context, Result};
use stratsync_core::{
    build_code, DocumentStore, GroupMapping, NewStrategy, ScalingTable, StrategyChange,
    StrategyRegistry, StrategyRegistryBuilder,
};
use tracing::error;

use crate::cli::AddStrategyArgs;

pub fn run(args: AddStrategyArgs) -> Result<()> {
    let filter_table = args
        .table
        .as_deref()
        .map(|path| {
            ScalingTable::load_sheet(Path::new(path), &args.sheet)
                .with_context(|| format!("failed to load scaling table {path}"))
        })
        .transpose()?;
    let builder = open_builder(&args.mapping, &args.yaml_dir, filter_table.as_ref())?;
    let mut registry = open_registry(&args.registry)?;
    let request = NewStrategy {
        group: args.group,
        description: args.description,
        suffix: args.suffix,
        custom_id: args.id,
        update: args.update,
    };
    let change = builder
        .add_strategy(&mut registry, &request)
        .with_context(|| describe_failure(&request))?;
    report_change(&change);
    Ok(())
}

pub fn open_builder(
    mapping: &str,
    yaml_dir: &str,
    table: Option<&ScalingTable>,
) -> Result<StrategyRegistryBuilder> {
    let mapping = GroupMapping::load(Path::new(mapping))
        .with_context(|| format!("invalid strategy group mapping {mapping}"))?;
    let builder = StrategyRegistryBuilder::new(mapping, DocumentStore::new(yaml_dir));
    Ok(match table {
        Some(table) => builder.with_strategy_filter(table.transformations_per_strategy()),
        None => builder,
    })
}

pub fn open_registry(path: &str) -> Result<StrategyRegistry> {
    StrategyRegistry::open(path).with_context(|| format!("failed to open registry {path}"))
}

/// Applies each request in order. A failed request is logged and counted; the
/// remaining requests still run.
pub fn apply_all(
    builder: &StrategyRegistryBuilder,
    registry: &mut StrategyRegistry,
    requests: &[NewStrategy],
) -> usize {
    let mut failed = 0;
    for request in requests {
        match builder.add_strategy(registry, request) {
            Ok(change) => report_change(&change),
            Err(err) => {
                error!(
                    group = %request.group,
                    strategy = %request.suffix,
                    error = %err,
                    "{}",
                    describe_failure(request)
                );
                failed += 1;
            }
        }
    }
    failed
}

fn describe_failure(request: &NewStrategy) -> String {
    let code = build_code(&request.group, &request.suffix);
    if request.update {
        format!("failed to update strategy {code}")
    } else {
        format!("failed to add strategy {code}")
    }
}

fn report_change(change: &StrategyChange) {
    match change {
        StrategyChange::Added(row) => println!(
            "[stratsync] added strategy {} (id {}): {}",
            row.strategy_code, row.strategy_id, row.transformation_specification
        ),
        StrategyChange::Updated {
            strategy_id,
            transformation_specification,
        } => println!(
            "[stratsync] updated strategy id {}: {}",
            strategy_id, transformation_specification
        ),
    }
}
