//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Recall maintenance CLI
///
/// Consolidates a character's memory tiers and applies producer feedback.
#[derive(Parser, Debug)]
#[command(name = "recall")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: $RECALL_DIR/config.toml or ~/.recall/config.toml)
    #[arg(long, global = true, env = "RECALL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Character whose memory is opened (overrides the config file)
    #[arg(long, global = true)]
    pub character: Option<String>,

    /// Inference executable, invoked as `<infer> --prompt <prompt>`
    #[arg(long, global = true, env = "RECALL_INFER", default_value = "infer")]
    pub infer: PathBuf,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Consolidate core and long-term memory and prune old turns
    Consolidate,

    /// Apply producer corrections from a JSON file
    Feedback {
        /// Path to a JSON array of {user_input, character_response, correct_response}
        file: PathBuf,
    },

    /// Show record counts per tier
    Stats,
}
