//! CLI commands and argument parsing.

pub mod tags;

use clap::{Parser, Subcommand};

/// Kairos - Resolve the current tag of a container image
#[derive(Parser)]
#[command(name = "kairos")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Commands {
    /// List an image's tags, filtered and ordered by a constraint
    Tags(tags::TagsArgs),

    /// Print version information
    Version,
}
