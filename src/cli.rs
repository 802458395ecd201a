// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "nova", version, about = "Agent execution and continuous conversation engine")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to a config file layered on top of the discovered defaults.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP surface and the cron/summary background loop (default).
    Serve,
    /// Print the fully merged configuration as YAML and exit.
    ShowConfig,
    /// Generate a new bearer token, print it once, and overwrite the token file.
    RegenerateToken,
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }
}
