//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "tunebox", version = VERSION, about = "Query a music library and play the results")]
pub struct Args {
    /// Config file (TOML); defaults to $TUNEBOX_CONFIG or the user config directory
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Library database, overriding the config file
    #[arg(short, long, global = true)]
    pub library: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add audio files under the given directories to the library
    Import {
        /// Directories to scan; defaults to the configured music directory
        paths: Vec<PathBuf>,
    },
    /// List tracks or albums matching a query
    #[command(name = "list", visible_alias = "ls")]
    List {
        /// Query albums instead of tracks
        #[arg(short, long)]
        album: bool,
        /// Output template, e.g. '$artist - $title'
        #[arg(short, long)]
        format: Option<String>,
        /// Print paths instead of formatted entries
        #[arg(short, long, conflicts_with = "format")]
        path: bool,
        /// Query terms; `-field:term` negates
        #[arg(allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Send matching tracks or albums to a music player
    Play {
        /// Query albums instead of tracks
        #[arg(short, long)]
        album: bool,
        /// Extra arguments for the player command
        #[arg(short = 'A', long, allow_hyphen_values = true)]
        args: Option<String>,
        /// Skip the warning threshold prompt
        #[arg(short, long)]
        yes: bool,
        /// Query terms; `-field:term` negates
        #[arg(allow_hyphen_values = true)]
        query: Vec<String>,
    },
    /// Show the effective configuration
    Config {
        /// Print only the config file location
        #[arg(short, long)]
        path: bool,
    },
}
