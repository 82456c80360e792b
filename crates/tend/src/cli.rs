//! CLI argument definitions using clap derive macros.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Coordinate long-running assistant sessions hosted in tmux
///
/// Run without a subcommand to open the interactive monitor.
#[derive(Parser, Debug)]
#[command(name = "tend")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the assistant in a new tmux session and attach to it
    New(NewArgs),

    /// List sessions
    Ls {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Attach to a session
    Attach {
        /// Session id or unique prefix
        session: String,

        /// Detach other clients first
        #[arg(short, long)]
        force: bool,
    },

    /// Kill sessions and delete their records
    Kill(KillArgs),

    /// Delete records of exited sessions
    Prune {
        /// Only prune sessions not updated for this long (e.g. 30m, 12h, 7d)
        #[arg(long, default_value = "7d", conflicts_with = "all")]
        max_age: String,

        /// Prune every exited session regardless of age
        #[arg(long)]
        all: bool,
    },

    /// Ingest one hook event from stdin (called by the assistant)
    Hook,

    /// Ask the terminal attached to a session to come to the front
    Focus {
        /// Session id or prefix; defaults to $TEND_SESSION_ID
        session: Option<String>,
    },

    /// Run diagnostics
    Doctor,

    /// Show version
    Version,
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Working directory (defaults to the current directory)
    #[arg(short = 'C', long)]
    pub cwd: Option<PathBuf>,

    /// Resume an existing conversation
    #[arg(short, long)]
    pub resume: Option<String>,

    /// Session id to use instead of a generated one
    #[arg(short, long)]
    pub label: Option<String>,

    /// Create the session without attaching
    #[arg(short, long)]
    pub detach: bool,
}

#[derive(Args, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["session", "all", "idle"])))]
pub struct KillArgs {
    /// Session id or unique prefix
    pub session: Option<String>,

    /// Kill every session
    #[arg(long)]
    pub all: bool,

    /// Kill sessions that are idle
    #[arg(long)]
    pub idle: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,
}
