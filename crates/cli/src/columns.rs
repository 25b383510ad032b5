use std::path::Path;

use anyhow::{Context, Result};
use stratsync_core::{add_missing_columns, compare_columns, RawTable};

pub fn compare(left: String, right: String) -> Result<()> {
    let left_table = read(&left)?;
    let right_table = read(&right)?;
    let diff = compare_columns(&left_table, &right_table);
    println!(
        "Columns in {left} but not in {right}: {}",
        render(&diff.only_in_left)
    );
    println!(
        "Columns in {right} but not in {left}: {}",
        render(&diff.only_in_right)
    );
    Ok(())
}

pub fn align(source: String, target: String, output: String) -> Result<()> {
    let source_table = read(&source)?;
    let target_table = read(&target)?;
    let added = compare_columns(&source_table, &target_table).only_in_left;
    let merged = add_missing_columns(&source_table, target_table);
    merged
        .write(Path::new(&output))
        .with_context(|| format!("failed to write {output}"))?;
    println!(
        "[stratsync] wrote {output} with {} added columns: {}",
        added.len(),
        render(&added)
    );
    Ok(())
}

fn read(path: &str) -> Result<RawTable> {
    RawTable::read(Path::new(path)).with_context(|| format!("failed to read table {path}"))
}

fn render(columns: &[String]) -> String {
    if columns.is_empty() {
        "(none)".to_string()
    } else {
        columns.join(", ")
    }
}
