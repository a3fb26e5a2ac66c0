//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Unattended Chzzk live-stream recorder.
#[derive(Debug, Parser)]
#[command(name = "chzzk-recorder", version, about)]
pub struct CliArgs {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "./config.json")]
    pub config: PathBuf,

    /// Override `logLevel` from the config file for this run.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override `recordingsRoot` from the config file for this run.
    #[arg(long)]
    pub recordings_root: Option<PathBuf>,
}
