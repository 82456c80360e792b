//! Per-session inbox for cross-process messages.
//!
//! Any process may post; the single watcher running for the duration of an
//! attach consumes. Each message is its own file under
//! `<root>/<session>/`, written via temp file + rename, and named so that
//! lexicographic order is post order. Nothing expires: messages for a session
//! nobody is attached to wait until the next attach.

use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::validate_id;
use crate::types::{InboxEntry, InboxMessage, MessageKind};

static POST_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone)]
pub struct Inbox {
    root: PathBuf,
}

impl Inbox {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> Result<PathBuf> {
        validate_id(session_id)?;
        Ok(self.root.join(session_id))
    }

    /// Append a message to a session's channel. Never waits for delivery.
    pub fn post(&self, session_id: &str, kind: MessageKind, payload: &str) -> Result<PathBuf> {
        let dir = self.session_dir(session_id)?;
        fs::create_dir_all(&dir)?;

        let now = Utc::now();
        let entry = InboxEntry {
            kind,
            payload: payload.to_string(),
            timestamp: now,
        };
        let nanos = now.timestamp_nanos_opt().unwrap_or_default().max(0);
        let name = format!(
            "{:020}-{:010}-{:06}.json",
            nanos,
            std::process::id(),
            POST_SEQ.fetch_add(1, Ordering::Relaxed) % 1_000_000
        );
        let target = dir.join(name);

        let mut tmp = tempfile::Builder::new().prefix(".post-").tempfile_in(&dir)?;
        tmp.write_all(&serde_json::to_vec(&entry)?)?;
        tmp.persist(&target)?;

        debug!("Posted {} message to {}", kind, session_id);
        Ok(target)
    }

    /// Entries waiting for a session, oldest first.
    fn scan(&self, session_id: &str) -> Result<Vec<PathBuf>> {
        let dir = self.session_dir(session_id)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension().and_then(|e| e.to_str()) == Some("json")
                    && !p
                        .file_name()
                        .and_then(|n| n.to_str())
                        .is_some_and(|n| n.starts_with('.'))
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Messages waiting for a session, in post order. Does not consume.
    pub fn pending(&self, session_id: &str) -> Result<Vec<InboxMessage>> {
        Ok(self
            .scan(session_id)?
            .into_iter()
            .filter_map(|path| read_entry(session_id, &path).ok())
            .collect())
    }

    /// Deliver every waiting message to `handler` and remove it.
    ///
    /// `delivered` remembers entries handed out but not yet removed, so a
    /// failed removal never produces a second delivery.
    pub fn poll_once(
        &self,
        session_id: &str,
        delivered: &mut HashSet<String>,
        handler: &mut dyn FnMut(InboxMessage),
    ) -> Result<usize> {
        let mut count = 0;
        for path in self.scan(session_id)? {
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(String::from) else {
                continue;
            };
            if !delivered.contains(&name) {
                match read_entry(session_id, &path) {
                    Ok(message) => {
                        delivered.insert(name.clone());
                        handler(message);
                        count += 1;
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Dropping malformed inbox entry")
                    }
                }
            }
            match fs::remove_file(&path) {
                Ok(()) => {
                    delivered.remove(&name);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    delivered.remove(&name);
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to remove inbox entry")
                }
            }
        }
        Ok(count)
    }

    /// Start consuming a session's messages until the returned guard is dropped.
    pub fn watch<F>(&self, session_id: &str, interval: Duration, mut handler: F) -> InboxWatcher
    where
        F: FnMut(InboxMessage) + Send + 'static,
    {
        let inbox = self.clone();
        let session_id = session_id.to_string();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut delivered = HashSet::new();
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            debug!("Inbox watcher started for {}", session_id);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        if let Err(e) = inbox.poll_once(&session_id, &mut delivered, &mut handler) {
                            warn!("Inbox poll for {} failed: {}", session_id, e);
                        }
                    }
                }
            }
            debug!("Inbox watcher stopped for {}", session_id);
        });

        InboxWatcher {
            handle: Some(handle),
            stop: Some(stop_tx),
        }
    }

    /// Remove a session's channel and anything still in it.
    pub fn clear(&self, session_id: &str) -> Result<()> {
        let dir = self.session_dir(session_id)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn read_entry(session_id: &str, path: &Path) -> Result<InboxMessage> {
    let raw = fs::read_to_string(path)?;
    let entry: InboxEntry = serde_json::from_str(&raw)?;
    Ok(InboxMessage {
        session_id: session_id.to_string(),
        kind: entry.kind,
        payload: entry.payload,
        timestamp: entry.timestamp,
    })
}

/// Running inbox watcher. Dropping it stops the watcher.
pub struct InboxWatcher {
    handle: Option<JoinHandle<()>>,
    stop: Option<oneshot::Sender<()>>,
}

impl InboxWatcher {
    /// Stop and wait for the watcher task to finish.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for InboxWatcher {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
