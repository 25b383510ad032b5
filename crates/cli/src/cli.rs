use clap::{ArgAction, Args, Parser, Subcommand};
use stratsync_core::{MissingMagnitudePolicy, DEFAULT_SHEET};

#[derive(Parser, Debug)]
#[command(
    name = "stratsync",
    version,
    about = "Scale strategy transformations and maintain the strategy registry"
)]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write one scaled document per (row, strategy column) of the table.
    Scale {
        table: String,
        #[arg(long)]
        yaml_dir: String,
        /// Worksheet to read when TABLE is a workbook.
        #[arg(long, default_value = DEFAULT_SHEET)]
        sheet: String,
        /// `copy` or `skip`; defaults to STRATSYNC_MISSING_MAGNITUDE, then `copy`.
        #[arg(long)]
        missing_magnitude: Option<MissingMagnitudePolicy>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Add a strategy to the registry, or refresh one with --update.
    AddStrategy(AddStrategyArgs),
    Run {
        #[arg(long, default_value = "stratsync.yaml")]
        config: String,
    },
    /// Print the country and SSP inputs named by a run-level YAML file.
    ShowConfig {
        #[arg(default_value = "config.yaml")]
        path: String,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    CompareColumns {
        left: String,
        right: String,
    },
    /// Copy the columns of SOURCE that TARGET lacks into TARGET.
    AlignColumns {
        source: String,
        target: String,
        #[arg(long)]
        output: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AddStrategyArgs {
    #[arg(long, default_value = "strategy_definitions.csv")]
    pub registry: String,
    #[arg(long, default_value = "strategy_mapping.yaml")]
    pub mapping: String,
    #[arg(long)]
    pub yaml_dir: String,
    #[arg(long)]
    pub group: String,
    #[arg(long, default_value = "")]
    pub description: String,
    #[arg(long)]
    pub suffix: String,
    #[arg(long)]
    pub id: Option<i64>,
    #[arg(long, default_value_t = false)]
    pub update: bool,
    /// Scaling table used to keep only the codes each strategy uses.
    #[arg(long)]
    pub table: Option<String>,
    #[arg(long, default_value = DEFAULT_SHEET)]
    pub sheet: String,
}
