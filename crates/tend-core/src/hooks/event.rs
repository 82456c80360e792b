//! Hook event payloads and the status transition table.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::error::{Error, Result};
use crate::types::SessionStatus;

/// One hook invocation, as written to stdin by the assistant tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookEvent {
    /// The assistant's conversation id.
    pub session_id: Option<String>,
    pub transcript_path: Option<String>,
    pub cwd: Option<String>,
    pub permission_mode: Option<String>,
    pub hook_event_name: String,
    pub notification_type: Option<String>,
    pub message: Option<String>,
    pub prompt: Option<String>,
    pub stop_hook_active: Option<bool>,
    pub tool_name: Option<String>,
    pub agent_type: Option<String>,
    pub agent_id: Option<String>,
}

impl HookEvent {
    /// Parse a single JSON object. Anything else is a validation error.
    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let event: HookEvent = serde_json::from_reader(reader)
            .map_err(|e| Error::Validation(format!("malformed hook payload: {}", e)))?;
        if event.hook_event_name.trim().is_empty() {
            return Err(Error::Validation(
                "hook payload has no hook_event_name".to_string(),
            ));
        }
        Ok(event)
    }

    pub fn kind(&self) -> HookKind {
        HookKind::parse(&self.hook_event_name)
    }

    /// Conversation id, if present and non-empty.
    pub fn conversation_id(&self) -> Option<&str> {
        self.session_id.as_deref().filter(|s| !s.is_empty())
    }
}

/// Hook event kinds the engine knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookKind {
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    PostToolUseFailure,
    SubagentStart,
    SubagentStop,
    Stop,
    SessionStart,
    PermissionRequest,
    Notification,
    Other(String),
}

impl HookKind {
    pub fn parse(name: &str) -> Self {
        match name {
            "UserPromptSubmit" => HookKind::UserPromptSubmit,
            "PreToolUse" => HookKind::PreToolUse,
            "PostToolUse" => HookKind::PostToolUse,
            "PostToolUseFailure" => HookKind::PostToolUseFailure,
            "SubagentStart" => HookKind::SubagentStart,
            "SubagentStop" => HookKind::SubagentStop,
            "Stop" => HookKind::Stop,
            "SessionStart" => HookKind::SessionStart,
            "PermissionRequest" => HookKind::PermissionRequest,
            "Notification" => HookKind::Notification,
            other => HookKind::Other(other.to_string()),
        }
    }
}

/// Status change requested by an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: SessionStatus,
    pub detail: Option<String>,
}

impl Transition {
    fn to(status: SessionStatus, detail: Option<String>) -> Option<Self> {
        Some(Self { status, detail })
    }
}

/// Map an event to the status it implies, or `None` for a no-op.
pub fn transition(event: &HookEvent) -> Option<Transition> {
    match event.kind() {
        HookKind::UserPromptSubmit => Transition::to(SessionStatus::Working, None),
        HookKind::PreToolUse | HookKind::PostToolUse | HookKind::PostToolUseFailure => {
            Transition::to(SessionStatus::Working, event.tool_name.clone())
        }
        // Subagent events can arrive after the parent's Stop; applying them
        // would flip an Idle session back to Working.
        HookKind::SubagentStart | HookKind::SubagentStop => None,
        HookKind::Stop | HookKind::SessionStart => Transition::to(SessionStatus::Idle, None),
        HookKind::PermissionRequest => Transition::to(
            SessionStatus::AwaitingPermission,
            Some(
                event
                    .tool_name
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| "permission".to_string()),
            ),
        ),
        HookKind::Notification => match event.notification_type.as_deref() {
            Some("permission_prompt") => {
                Transition::to(SessionStatus::AwaitingPermission, event.message.clone())
            }
            Some("elicitation_dialog") => {
                Transition::to(SessionStatus::AwaitingInput, event.message.clone())
            }
            _ => None,
        },
        HookKind::Other(_) => None,
    }
}
