//! Command-line interface for strictly_pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use strictly_pipeline::Mark;

/// Strictly Pipeline - play tic-tac-toe against a deadline-bounded AI pipeline
#[derive(Parser, Debug)]
#[command(name = "strictly_pipeline")]
#[command(about = "Scout, strategist and executor playing tic-tac-toe", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to agent configuration file
    #[arg(short, long, global = true, default_value = "agent_config.toml")]
    pub config: PathBuf,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play against the pipeline in the terminal
    Play {
        /// Mark that moves first (defaults to the config's first_player)
        #[arg(long)]
        first: Option<Mark>,
    },

    /// Let the pipeline play both sides and report the results
    Simulate {
        /// Number of games to play
        #[arg(short, long, default_value = "10")]
        games: usize,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}
