use std::fs;
use std::path::Path;

use stratsync_core::{
    DocumentStore, GroupMapping, MagnitudeSlot, MissingMagnitudePolicy, NewStrategy,
    ScalingEngine, ScalingTable, StrategyChange, StrategyRegistry, StrategyRegistryBuilder,
    TransformationDocument,
};
use tempfile::tempdir;

#[test]
fn scaling_writes_only_present_strategy_columns() {
    let dir = tempdir().unwrap();
    let yaml_dir = dir.path().join("transformations");
    fs::create_dir_all(&yaml_dir).unwrap();
    fs::write(
        yaml_dir.join("t1.yaml"),
        "identifiers:\n  transformation_code: T1\n  transformation_name: Test\nparameters:\n  magnitude: 5\n",
    )
    .unwrap();
    let table_path = write_table(dir.path(), "t1.yaml,T1,Test,S,2.0,NaN\n");

    let table = ScalingTable::load(&table_path).unwrap();
    let engine = ScalingEngine::new(
        DocumentStore::new(&yaml_dir),
        MissingMagnitudePolicy::CopyThrough,
    );
    let report = engine.process(&table);

    assert_eq!(report.written().count(), 1);
    assert!(!yaml_dir.join("t1_strategy_b.yaml").exists());
    let derived = TransformationDocument::from_path(&yaml_dir.join("t1_strategy_a.yaml")).unwrap();
    match derived.magnitude().unwrap() {
        MagnitudeSlot::Present(value) => assert!((value - 10.0).abs() < 1e-9),
        other => panic!("unexpected magnitude slot {other:?}"),
    }
    assert_eq!(derived.transformation_code().unwrap(), "T1_STRATEGY_A");
    assert_eq!(
        derived.transformation_name().unwrap(),
        "Scaled Default Max Parameters by 2.0 - S: Test"
    );
}

#[test]
fn first_strategy_in_empty_registry_gets_range_minimum() {
    let dir = tempdir().unwrap();
    let yaml_dir = dir.path().join("transformations");
    fs::create_dir_all(&yaml_dir).unwrap();
    let mapping_path = dir.path().join("strategy_mapping.yaml");
    fs::write(&mapping_path, "strategy_groups:\n  PFLO: \"6000-6999\"\n").unwrap();

    let builder = StrategyRegistryBuilder::new(
        GroupMapping::load(&mapping_path).unwrap(),
        DocumentStore::new(&yaml_dir),
    );
    let mut registry = StrategyRegistry::open(dir.path().join("strategy_definitions.csv")).unwrap();
    let change = builder
        .add_strategy(&mut registry, &NewStrategy::add("PFLO", "desc", "new_strat"))
        .unwrap();

    match change {
        StrategyChange::Added(row) => {
            assert_eq!(row.strategy_id, 6000);
            assert_eq!(row.strategy_code, "PFLO:NEW_STRAT");
            assert_eq!(row.strategy, "new_strat");
        }
        other => panic!("expected an added row, got {other:?}"),
    }
}

#[test]
fn scaled_documents_feed_the_registry_specification() {
    let dir = tempdir().unwrap();
    let yaml_dir = dir.path().join("transformations");
    fs::create_dir_all(&yaml_dir).unwrap();
    for code in ["T1", "T2", "T3"] {
        fs::write(
            yaml_dir.join(format!("{}.yaml", code.to_lowercase())),
            format!("identifiers:\n  transformation_code: {code}\nparameters:\n  magnitude: 1\n"),
        )
        .unwrap();
    }
    let table_path = write_table(
        dir.path(),
        "t1.yaml,T1,One,S,1,\nt2.yaml,T2,Two,S,,2\nt3.yaml,T3,Three,S,0.5,0.5\n",
    );
    // A stale derived document from an earlier run that the table no longer uses.
    fs::write(
        yaml_dir.join("t9_strategy_a.yaml"),
        "identifiers:\n  transformation_code: T9_STRATEGY_A\n",
    )
    .unwrap();

    let table = ScalingTable::load(&table_path).unwrap();
    ScalingEngine::new(DocumentStore::new(&yaml_dir), MissingMagnitudePolicy::Skip).process(&table);

    let builder = StrategyRegistryBuilder::new(
        GroupMapping::parse("strategy_groups:\n  PFLO: 6000-6999\n").unwrap(),
        DocumentStore::new(&yaml_dir),
    )
    .with_strategy_filter(table.transformations_per_strategy());
    let mut registry = StrategyRegistry::open(dir.path().join("strategy_definitions.csv")).unwrap();
    builder
        .add_strategy(&mut registry, &NewStrategy::add("PFLO", "a", "a"))
        .unwrap();
    builder
        .add_strategy(&mut registry, &NewStrategy::add("PFLO", "b", "b"))
        .unwrap();

    let reopened = StrategyRegistry::open(registry.path()).unwrap();
    let specs = reopened
        .rows()
        .iter()
        .map(|row| (row.strategy_id, row.transformation_specification.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        specs,
        vec![(6000, "T1_STRATEGY_A|T3_STRATEGY_A"), (6001, "T2_STRATEGY_B|T3_STRATEGY_B")]
    );
}

fn write_table(dir: &Path, rows: &str) -> std::path::PathBuf {
    let path = dir.join("strategy_scalars.csv");
    fs::write(
        &path,
        format!(
            "transformation_yaml_name,transformation_code,transformation_name,subsector,strategy_a,strategy_b\n{rows}"
        ),
    )
    .unwrap();
    path
}
