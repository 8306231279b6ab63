//! gopro - Rename and merge GoPro recording fragments.
//!
//! The camera splits one recording into multiple chaptered files with
//! hard-to-read names like `GX010042.mp4`.
//! This tool groups the fragments of each recording,
//! renames them to a canonical date-based form,
//! and can merge them into a single output file with ffmpeg.

mod config;
mod gopro;

use std::path::PathBuf;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;

use crate::config::Config;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Rename and merge GoPro recording fragments"
)]
pub struct Args {
    /// Optional input directory with recording files
    #[arg(value_hint = clap::ValueHint::DirPath)]
    path: Option<PathBuf>,

    /// Really rename files instead of doing a dry run
    #[arg(short, long)]
    commit: bool,

    /// Merge the fragments of each recording into one file
    #[arg(short, long)]
    merge: bool,

    /// Output directory for merged recordings
    #[arg(short, long, name = "DIR", value_hint = clap::ValueHint::DirPath)]
    output: Option<PathBuf>,

    /// Skip renaming and only merge
    #[arg(short, long, requires = "merge")]
    skip_rename: bool,

    /// Generate shell completion
    #[arg(short = 'l', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle shell completion generation
    if let Some(ref shell) = args.completion {
        gopro_tools::generate_shell_completion(*shell, Args::command(), true, env!("CARGO_BIN_NAME"))
    } else {
        let config = Config::from_args(args)?;
        gopro::run(config).await
    }
}
