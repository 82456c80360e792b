//! Error types for tend-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using tend-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tend operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Invalid input: {0}")]
    Validation(String),

    // Resolution errors
    #[error("Session not found: {0}")]
    NotFound(String),

    #[error("Session id '{query}' is ambiguous; candidates: {}", candidates.join(", "))]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },

    #[error("Session already exists: {0}")]
    SessionExists(String),

    // Attach errors
    #[error("Session {id} already has {clients} attached client(s); use --force to take over")]
    AlreadyAttached { id: String, clients: u32 },

    #[error("Session {0} is not running")]
    NotAlive(String),

    // tmux errors
    #[error("tmux not found. Install tmux to use tend.")]
    TmuxNotFound,

    #[error("tmux error: {0}")]
    Tmux(String),

    // Store errors
    #[error("Corrupt session record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Command execution errors
    #[error("Command failed: {cmd}\n{stderr}")]
    CommandFailed { cmd: String, stderr: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an error from a command failure
    pub fn command_failed(cmd: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandFailed {
            cmd: cmd.into(),
            stderr: stderr.into(),
        }
    }

    /// Whether the error comes from resolving a user-supplied id.
    pub fn is_resolution(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Ambiguous { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}
