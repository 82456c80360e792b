//! Shared types for tend-core.
//!
//! These types are persisted by the store and the inbox, and shared with the
//! CLI and the monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

// ─────────────────────────────────────────────────────────────────────────────
// Session Types
// ─────────────────────────────────────────────────────────────────────────────

/// Conversational state of a tracked assistant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Working,
    Idle,
    AwaitingPermission,
    AwaitingInput,
    Exited,
}

impl SessionStatus {
    /// Every status, in declaration order.
    pub const ALL: [SessionStatus; 6] = [
        SessionStatus::Running,
        SessionStatus::Working,
        SessionStatus::Idle,
        SessionStatus::AwaitingPermission,
        SessionStatus::AwaitingInput,
        SessionStatus::Exited,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Working => "working",
            SessionStatus::Idle => "idle",
            SessionStatus::AwaitingPermission => "awaiting_permission",
            SessionStatus::AwaitingInput => "awaiting_input",
            SessionStatus::Exited => "exited",
        }
    }

    /// Short human label used in tables.
    pub fn label(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Working => "working",
            SessionStatus::Idle => "idle",
            SessionStatus::AwaitingPermission => "permission",
            SessionStatus::AwaitingInput => "input",
            SessionStatus::Exited => "exited",
        }
    }

    /// Sort rank; states that need the user come first.
    pub fn attention_priority(self) -> u8 {
        match self {
            SessionStatus::AwaitingPermission => 0,
            SessionStatus::AwaitingInput => 1,
            SessionStatus::Idle => 2,
            SessionStatus::Working => 3,
            SessionStatus::Running => 4,
            SessionStatus::Exited => 5,
        }
    }

    /// Statuses in which the assistant is blocked on the user.
    pub fn is_user_facing_wait(self) -> bool {
        matches!(
            self,
            SessionStatus::Idle | SessionStatus::AwaitingPermission | SessionStatus::AwaitingInput
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s || status.label() == s)
            .ok_or_else(|| Error::Validation(format!("unknown status: {}", s)))
    }
}

/// One tracked assistant session, persisted as `<id>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default)]
    pub auto_registered: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Attached tmux clients. Recomputed on every reconciliation, never persisted.
    #[serde(skip)]
    pub attached: u32,
}

impl SessionRecord {
    /// A fresh Running record.
    pub fn new(id: impl Into<String>, cwd: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            tmux_session: None,
            pid: None,
            cwd: cwd.into(),
            conversation_id: None,
            status: SessionStatus::Running,
            detail: None,
            auto_registered: false,
            created_at: now,
            updated_at: now,
            attached: 0,
        }
    }

    pub fn is_exited(&self) -> bool {
        self.status == SessionStatus::Exited
    }

    /// Case-insensitive substring match over the searchable fields.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        let needle = needle.to_lowercase();
        let fields = [
            Some(self.id.as_str()),
            Some(self.cwd.as_str()),
            Some(self.status.as_str()),
            Some(self.status.label()),
            self.detail.as_deref(),
            self.conversation_id.as_deref(),
        ];
        fields
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbox Types
// ─────────────────────────────────────────────────────────────────────────────

/// Kind of cross-process message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ask the attached terminal to raise its window.
    Focus,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Focus => f.write_str("focus"),
        }
    }
}

/// Wire form of an inbox entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxEntry {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}

/// A message delivered to a session's watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct InboxMessage {
    pub session_id: String,
    pub kind: MessageKind,
    pub payload: String,
    pub timestamp: DateTime<Utc>,
}
