mod cli;
mod columns;
mod config;
mod logging;
mod region;
mod run;
mod scale;
mod strategy;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = if cli.verbose {
        true
    } else {
        logging::env_flag()
    };
    logging::init(verbose);
    match cli.command {
        Command::Scale {
            table,
            yaml_dir,
            sheet,
            missing_magnitude,
            json,
        } => scale::run(table, yaml_dir, sheet, missing_magnitude, json),
        Command::AddStrategy(args) => strategy::run(args),
        Command::Run { config } => run::run_from_config(&config),
        Command::ShowConfig { path, json } => region::show(path, json),
        Command::CompareColumns { left, right } => columns::compare(left, right),
        Command::AlignColumns {
            source,
            target,
            output,
        } => columns::align(source, target, output),
    }
}
