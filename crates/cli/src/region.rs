use std::path::Path;

use anyhow::{Context, Result};
use stratsync_core::RegionConfig;

pub fn show(path: String, json: bool) -> Result<()> {
    let config = RegionConfig::load(Path::new(&path))
        .with_context(|| format!("failed to read run config {path}"))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else {
        println!("{}", render(&config));
    }
    Ok(())
}

fn render(config: &RegionConfig) -> String {
    format!(
        "Country Name: {}\nSSP Input File Name: {}\nSSP Transformation CW: {}",
        config.country_name, config.ssp_input_file_name, config.ssp_transformation_cw
    )
}
