//! The command line interface of the simulator.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

/// the command line interface of the simulator
#[derive(Parser, Debug)]
#[command(author, about, version)]
pub struct Cli {
    /// subcommand
    #[clap(subcommand)]
    pub subcmd: Operation,
}

/// the subcommands of the simulator
#[derive(Debug, Subcommand)]
pub enum Operation {
    /// replay a request trace through the memory channel
    Run(RunArgs),
    /// generate the shell completion script
    Completion(CompArgs),
}

/// the arguments of the run subcommand
#[derive(Debug, Args)]
pub struct RunArgs {
    /// the config file path
    pub config: PathBuf,
}

/// the arguments of the completion subcommand
#[derive(Debug, Args)]
pub struct CompArgs {
    /// the shell type
    pub shell: Shell,
}
