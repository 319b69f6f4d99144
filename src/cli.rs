use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "shinyhunt",
    about = "Vision-driven encounter automation with rare-variant detection",
    version
)]
pub struct Cli {
    /// Path to the settings file
    #[arg(short, long, default_value = "shinyhunt.toml")]
    pub config: PathBuf,

    /// Override the starting iteration from the settings file
    #[arg(long)]
    pub iteration: Option<u64>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
