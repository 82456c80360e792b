//! Liveness reconciliation.
//!
//! The persisted status is only what the last hook said. Before anything is
//! shown or acted on, it is checked against the multiplexer and the process
//! table:
//!
//! ```text
//! tmux session alive? ──yes──► keep status, refresh attached count
//!        │ no / none
//!        ▼
//! pid alive? ──yes──► keep status (hooks drive it)
//!        │ no / none
//!        ▼
//!     Exited
//! ```
//!
//! The result lives in memory only. Whoever observes an Exited transition is
//! responsible for persisting it ([`Reconciler::persist_transitions`]).

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::process::ProcessTable;
use crate::store::Store;
use crate::tmux::Multiplexer;
use crate::types::{SessionRecord, SessionStatus};

/// How a session was found to be alive (or not).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Backing tmux session exists.
    Backed,
    /// No tmux session, but the assistant process is still running.
    ProcessOnly,
    Exited,
}

/// Outcome of reconciling one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub liveness: Liveness,
    /// True when this call moved the record to Exited.
    pub became_exited: bool,
}

pub struct Reconciler<'a> {
    mux: &'a dyn Multiplexer,
    procs: &'a dyn ProcessTable,
}

impl<'a> Reconciler<'a> {
    pub fn new(mux: &'a dyn Multiplexer, procs: &'a dyn ProcessTable) -> Self {
        Self { mux, procs }
    }

    /// Reconcile a single record, querying the multiplexer for its session.
    pub fn reconcile(&self, record: &mut SessionRecord) -> Reconciled {
        let attached = record.tmux_session.as_deref().and_then(|name| {
            match self.mux.session_info(name) {
                Ok(info) => info.map(|s| s.attached),
                Err(e) => {
                    debug!("tmux query for {} failed: {}", name, e);
                    None
                }
            }
        });
        self.apply(record, attached)
    }

    /// Reconcile a batch with a single `list-sessions` query.
    pub fn reconcile_all(&self, records: &mut [SessionRecord]) -> Vec<Reconciled> {
        let live: HashMap<String, u32> = match self.mux.list_sessions() {
            Ok(sessions) => sessions.into_iter().map(|s| (s.name, s.attached)).collect(),
            Err(e) => {
                debug!("tmux list-sessions failed: {}", e);
                HashMap::new()
            }
        };

        records
            .iter_mut()
            .map(|record| {
                let attached = record
                    .tmux_session
                    .as_ref()
                    .and_then(|name| live.get(name).copied());
                self.apply(record, attached)
            })
            .collect()
    }

    fn apply(&self, record: &mut SessionRecord, tmux_attached: Option<u32>) -> Reconciled {
        if let Some(attached) = tmux_attached {
            record.attached = attached;
            return Reconciled {
                liveness: Liveness::Backed,
                became_exited: false,
            };
        }

        record.attached = 0;
        if record.pid.is_some_and(|pid| self.procs.is_alive(pid)) {
            return Reconciled {
                liveness: Liveness::ProcessOnly,
                became_exited: false,
            };
        }

        let became_exited = record.status != SessionStatus::Exited;
        if became_exited {
            debug!("Session {} has exited", record.id);
            record.status = SessionStatus::Exited;
            record.detail = None;
        }
        Reconciled {
            liveness: Liveness::Exited,
            became_exited,
        }
    }

    /// Write back records that newly became Exited. Failures are logged.
    pub fn persist_transitions(
        store: &Store,
        records: &mut [SessionRecord],
        outcomes: &[Reconciled],
    ) -> usize {
        let mut persisted = 0;
        for (record, outcome) in records.iter_mut().zip(outcomes) {
            if !outcome.became_exited {
                continue;
            }
            // Another writer may have replaced or removed the record since we read it.
            let mut current = match store.load(&record.id) {
                Ok(Some(current)) if current.status != SessionStatus::Exited => current,
                Ok(_) => continue,
                Err(e) => {
                    warn!("Cannot re-read {} before marking exited: {}", record.id, e);
                    continue;
                }
            };
            current.status = SessionStatus::Exited;
            current.detail = None;
            match store.save(&mut current) {
                Ok(()) => {
                    record.updated_at = current.updated_at;
                    persisted += 1;
                }
                Err(e) => warn!("Failed to persist exited status for {}: {}", record.id, e),
            }
        }
        persisted
    }
}
