//! Collaborators notified after a status transition.
//!
//! Title lookup, alert dispatch and usage accounting live outside tend. Each
//! is a trait with a small default implementation: the CLI wires in
//! command-backed versions from the user's configuration.

use serde_json::Value;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use tracing::debug;

use crate::error::{Error, Result};
use crate::hooks::event::HookEvent;
use crate::types::{SessionRecord, SessionStatus};

/// Transcript lines scanned when looking for a title.
const MAX_TITLE_SCAN_LINES: usize = 5000;
const MAX_TITLE_CHARS: usize = 80;

/// Payload handed to the notifier after every applied transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub session_id: String,
    pub previous: SessionStatus,
    pub current: SessionStatus,
    pub title: Option<String>,
    pub detail: Option<String>,
}

/// Resolves a human-readable conversation title.
pub trait TitleLookup: Send + Sync {
    fn title(&self, record: &SessionRecord, event: &HookEvent) -> Option<String>;
}

/// Receives status changes. Cooldown and alert policy belong to the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, change: &StatusChange) -> Result<()>;
}

/// Usage-accounting cache refreshed when a session starts waiting on the user.
pub trait UsageCache: Send + Sync {
    fn refresh(&self) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Titles
// ─────────────────────────────────────────────────────────────────────────────

/// Reads the assistant's JSONL transcript: the latest `summary` entry wins,
/// otherwise the first user prompt.
#[derive(Debug, Default, Clone)]
pub struct TranscriptTitles;

impl TitleLookup for TranscriptTitles {
    fn title(&self, _record: &SessionRecord, event: &HookEvent) -> Option<String> {
        let path = event.transcript_path.as_deref().filter(|p| !p.is_empty())?;
        let file = File::open(path).ok()?;
        title_from_lines(BufReader::new(file).lines().map_while(|l| l.ok()))
            .or_else(|| event.prompt.as_deref().map(clip_title))
    }
}

fn title_from_lines(lines: impl Iterator<Item = String>) -> Option<String> {
    let mut summary = None;
    let mut first_prompt = None;
    for line in lines.take(MAX_TITLE_SCAN_LINES) {
        let Ok(value) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        match value.get("type").and_then(Value::as_str) {
            Some("summary") => {
                if let Some(s) = value.get("summary").and_then(Value::as_str) {
                    summary = Some(clip_title(s));
                }
            }
            Some("user") if first_prompt.is_none() => {
                first_prompt = user_text(&value).map(|t| clip_title(&t));
            }
            _ => {}
        }
    }
    summary.or(first_prompt)
}

fn user_text(value: &Value) -> Option<String> {
    let content = value.get("message")?.get("content")?;
    let text = match content {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => parts.iter().find_map(|p| {
            (p.get("type").and_then(Value::as_str) == Some("text"))
                .then(|| p.get("text").and_then(Value::as_str).map(String::from))
                .flatten()
        }),
        _ => None,
    };
    text.filter(|s| !s.trim().is_empty())
}

fn clip_title(raw: &str) -> String {
    let line = raw.lines().find(|l| !l.trim().is_empty()).unwrap_or("").trim();
    if line.chars().count() <= MAX_TITLE_CHARS {
        return line.to_string();
    }
    let clipped: String = line.chars().take(MAX_TITLE_CHARS - 1).collect();
    format!("{}…", clipped)
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Logs the change and does nothing else.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, change: &StatusChange) -> Result<()> {
        debug!(
            session = %change.session_id,
            previous = %change.previous,
            current = %change.current,
            title = change.title.as_deref().unwrap_or(""),
            "Status change"
        );
        Ok(())
    }
}

/// Runs a user-configured command for every change, without waiting for it.
///
/// The change is passed through `TEND_*` environment variables.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    command: String,
}

impl CommandNotifier {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    fn env(change: &StatusChange) -> Vec<(&'static str, String)> {
        vec![
            ("TEND_SESSION_ID", change.session_id.clone()),
            ("TEND_PREVIOUS_STATUS", change.previous.to_string()),
            ("TEND_STATUS", change.current.to_string()),
            ("TEND_TITLE", change.title.clone().unwrap_or_default()),
            ("TEND_DETAIL", change.detail.clone().unwrap_or_default()),
        ]
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, change: &StatusChange) -> Result<()> {
        spawn_detached(&self.command, &Self::env(change))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usage cache
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct NoUsageCache;

impl UsageCache for NoUsageCache {
    fn refresh(&self) -> Result<()> {
        Ok(())
    }
}

/// Kicks off a configured refresh command in the background.
#[derive(Debug, Clone)]
pub struct CommandUsageCache {
    command: String,
}

impl CommandUsageCache {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl UsageCache for CommandUsageCache {
    fn refresh(&self) -> Result<()> {
        spawn_detached(&self.command, &[])
    }
}

/// Start `sh -c <command>` with null stdio and return immediately.
pub fn spawn_detached(command: &str, env: &[(&str, String)]) -> Result<()> {
    let mut cmd = Command::new("sh");
    cmd.args(["-c", command])
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    for (key, value) in env {
        cmd.env(key, value);
    }
    let child = cmd
        .spawn()
        .map_err(|e| Error::command_failed(command, e.to_string()))?;
    debug!("Spawned '{}' as pid {}", command, child.id());
    Ok(())
}
