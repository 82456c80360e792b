//! tend-core - Core library for tend
//!
//! Tracks assistant sessions hosted in tmux. Shared by every `tend`
//! invocation, from the interactive monitor to the short-lived hook process:
//!
//! - **store**: One JSON file per session, atomic writes, no locks
//! - **reconcile**: Persisted status checked against tmux and the process table
//! - **hooks**: Hook events to status transitions
//! - **inbox**: Per-session cross-process messages
//! - **lifecycle**: Create, attach, kill, prune
//! - **tmux**: tmux session management
//! - **process**: Process tree queries

pub mod error;
pub mod hooks;
pub mod inbox;
pub mod lifecycle;
pub mod process;
pub mod reconcile;
pub mod store;
pub mod tmux;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use error::{Error, Result};
pub use inbox::Inbox;
pub use lifecycle::{Controller, ControllerSettings, CreateRequest, KillTarget};
pub use reconcile::{Liveness, Reconciler};
pub use store::Store;
pub use types::{SessionRecord, SessionStatus};
