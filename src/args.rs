//! Command-line argument definitions.
//!
//! The default invocation takes a bare URL (`adam <url> [-o name]`);
//! session management goes through the `resume`, `update` and `ls`
//! subcommands.

use clap::{Parser, Subcommand};

/// Accelerated, resumable file downloader.
///
/// Splits the resource into byte ranges fetched in parallel, checkpoints
/// progress to the session library, and resumes interrupted transfers
/// exactly where they left off.
#[derive(Parser, Debug)]
#[command(name = "adam", author, version, about, args_conflicts_with_subcommands = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// URL of the file to download.
    pub url: Option<String>,

    /// Destination filename (defaults to the last URL path segment).
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resume a saved session from the ongoing library
    Resume {
        /// Filename shown by `adam ls`
        filename: String,
    },
    /// Rewrite the URL of an existing session (for expired signed links)
    Update {
        filename: String,
        new_url: String,
    },
    /// List sessions from the ongoing and complete libraries
    Ls {
        /// Only ongoing sessions
        #[arg(long, conflicts_with = "complete")]
        ongoing: bool,
        /// Only completed sessions
        #[arg(short, long)]
        complete: bool,
    },
}
