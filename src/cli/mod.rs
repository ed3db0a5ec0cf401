//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, JobsCommand, RunCommand, ValidateCommand};

/// A local CI workflow runner
#[derive(Debug, Parser, Clone)]
#[command(name = "conveyor")]
#[command(version = "0.1.0")]
#[command(about = "A local CI workflow runner with matrix fan-out and concurrency groups", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run a workflow for an event
    Run(RunCommand),

    /// Validate a workflow configuration
    Validate(ValidateCommand),

    /// Show the planned job expansion for an event
    Jobs(JobsCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}

use std::ffi::OsString;
