use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;

pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Inspect a persisted replay file.
    Replay(ReplayArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Replay file to inspect.
    pub path: PathBuf,

    /// Print the full unit listing for this frame index.
    #[arg(long, value_name = "INDEX")]
    pub frame: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build information.
    #[arg(long)]
    pub extended: bool,
}
