use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "backfetch")]
#[command(about = "Backfetch queue file tools", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the download descriptions in a queue backing file
    Inspect(FileArgs),
    /// Check that a queue backing file parses cleanly
    Validate(FileArgs),
}

#[derive(clap::Args, Debug)]
pub struct FileArgs {
    /// Path to the JSON queue backing file
    pub file: PathBuf,
}
