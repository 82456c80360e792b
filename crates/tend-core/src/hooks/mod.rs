//! Hook ingestion.
//!
//! ```text
//! stdin JSON ─► HookEvent ─► transition() ─► resolve session ─► Store::save
//!                                                   │
//!                                                   └─► usage refresh, title, notifier
//! ```

mod collaborators;
mod engine;
mod event;

pub use collaborators::*;
pub use engine::*;
pub use event::*;
