//! Status engine: apply hook events to session records.
//!
//! Every hook invocation is a short-lived process that reads one event,
//! resolves which session it belongs to, applies the transition table and
//! writes the record back. Resolution failures are never errors: the
//! assistant process must not be blocked by bookkeeping.

use tracing::{debug, info, warn};

use crate::error::Result;
use crate::hooks::collaborators::{
    LogNotifier, NoUsageCache, Notifier, StatusChange, TitleLookup, TranscriptTitles, UsageCache,
};
use crate::hooks::event::{HookEvent, transition};
use crate::process::{ProcessTable, find_ancestor};
use crate::store::Store;
use crate::types::{SessionRecord, SessionStatus};

/// Length of ids derived from a conversation id.
pub const SHORT_ID_LEN: usize = 8;

/// Process-boundary facts about the hook invocation, gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct HookContext {
    /// Session id handed down by `tend` to the processes it spawned.
    pub session_id: Option<String>,
    /// tmux session hosting the hook process, if any.
    pub tmux_session: Option<String>,
    /// Parent of the hook process; the ancestor walk starts here.
    pub parent_pid: Option<u32>,
    /// Fallback working directory when the event carries none.
    pub cwd: Option<String>,
}

/// What `ingest` did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// The event kind does not change status.
    Ignored,
    /// No session could be found or registered for the event.
    Unresolved,
    Updated {
        session_id: String,
        previous: SessionStatus,
        current: SessionStatus,
        registered: bool,
    },
}

pub struct StatusEngine {
    store: Store,
    procs: Box<dyn ProcessTable>,
    process_names: Vec<String>,
    titles: Box<dyn TitleLookup>,
    notifier: Box<dyn Notifier>,
    usage: Box<dyn UsageCache>,
}

impl StatusEngine {
    pub fn new(store: Store, procs: Box<dyn ProcessTable>, process_names: Vec<String>) -> Self {
        Self {
            store,
            procs,
            process_names,
            titles: Box::new(TranscriptTitles),
            notifier: Box::new(LogNotifier),
            usage: Box::new(NoUsageCache),
        }
    }

    pub fn with_titles(mut self, titles: Box<dyn TitleLookup>) -> Self {
        self.titles = titles;
        self
    }

    pub fn with_notifier(mut self, notifier: Box<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_usage_cache(mut self, usage: Box<dyn UsageCache>) -> Self {
        self.usage = usage;
        self
    }

    /// Apply one event. Only store write failures surface as errors.
    pub fn ingest(&self, event: &HookEvent, ctx: &HookContext) -> Result<IngestOutcome> {
        let Some(next) = transition(event) else {
            debug!("Ignoring {} event", event.hook_event_name);
            return Ok(IngestOutcome::Ignored);
        };

        let Some((mut record, registered)) = self.resolve(event, ctx) else {
            debug!(
                "No session for {} event (conversation {:?})",
                event.hook_event_name,
                event.conversation_id()
            );
            return Ok(IngestOutcome::Unresolved);
        };

        let previous = record.status;
        record.status = next.status;
        record.detail = next.detail;
        self.store.save(&mut record)?;

        if registered {
            info!(
                "Auto-registered session {} for conversation {}",
                record.id,
                event.conversation_id().unwrap_or("-")
            );
        }
        debug!("{}: {} -> {} ({})", record.id, previous, record.status, event.hook_event_name);

        self.after_transition(&record, previous, event);

        Ok(IngestOutcome::Updated {
            session_id: record.id,
            previous,
            current: next.status,
            registered,
        })
    }

    fn after_transition(&self, record: &SessionRecord, previous: SessionStatus, event: &HookEvent) {
        if record.status.is_user_facing_wait() && previous != record.status {
            if let Err(e) = self.usage.refresh() {
                warn!("Usage cache refresh failed: {}", e);
            }
        }

        let change = StatusChange {
            session_id: record.id.clone(),
            previous,
            current: record.status,
            title: self.titles.title(record, event),
            detail: record.detail.clone(),
        };
        if let Err(e) = self.notifier.notify(&change) {
            warn!("Notifier failed for {}: {}", record.id, e);
        }
    }

    /// Find the record an event belongs to. The bool is true for a newly
    /// auto-registered record.
    pub fn resolve(&self, event: &HookEvent, ctx: &HookContext) -> Option<(SessionRecord, bool)> {
        let conversation = event.conversation_id();

        if let Some(id) = ctx.session_id.as_deref().filter(|s| !s.is_empty()) {
            match self.store.load(id) {
                Ok(Some(mut record)) => {
                    if let Some(conv) = conversation {
                        record.conversation_id = Some(conv.to_string());
                    }
                    return Some((record, false));
                }
                Ok(None) => debug!("Propagated session id {} has no record", id),
                Err(e) => warn!("Cannot load propagated session {}: {}", id, e),
            }
        }

        if let Some(conv) = conversation {
            match self.store.find_by_conversation(conv) {
                Ok(Some(record)) => return Some((record, false)),
                Ok(None) => {}
                Err(e) => {
                    warn!("Cannot search store for conversation {}: {}", conv, e);
                    return None;
                }
            }
        }

        // A tend-created session whose assistant started without our env
        // (e.g. a relaunch inside the pane) still owns its tmux session.
        if let (Some(conv), Some(tmux)) = (conversation, ctx.tmux_session.as_deref()) {
            if let Some(mut record) = self.unbound_record_for_tmux(tmux) {
                record.conversation_id = Some(conv.to_string());
                return Some((record, false));
            }
        }

        self.auto_register(event, ctx).map(|r| (r, true))
    }

    fn unbound_record_for_tmux(&self, tmux: &str) -> Option<SessionRecord> {
        self.store.list().ok()?.into_iter().find(|r| {
            r.tmux_session.as_deref() == Some(tmux)
                && r.conversation_id.is_none()
                && r.status != SessionStatus::Exited
        })
    }

    fn auto_register(&self, event: &HookEvent, ctx: &HookContext) -> Option<SessionRecord> {
        let conversation = event.conversation_id()?;
        let pid = ctx
            .parent_pid
            .and_then(|p| find_ancestor(self.procs.as_ref(), p, &self.process_names));
        if ctx.tmux_session.is_none() && pid.is_none() {
            debug!("Not registering {}: no tmux session or assistant process", conversation);
            return None;
        }

        let cwd = event
            .cwd
            .clone()
            .or_else(|| ctx.cwd.clone())
            .unwrap_or_default();
        let mut record = SessionRecord::new(self.unique_id(&short_id(conversation)), cwd);
        record.tmux_session = ctx.tmux_session.clone();
        record.pid = pid;
        record.conversation_id = Some(conversation.to_string());
        record.auto_registered = true;
        Some(record)
    }

    fn unique_id(&self, base: &str) -> String {
        if !self.store.exists(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}-{}", base, n))
            .find(|candidate| !self.store.exists(candidate))
            .unwrap_or_else(|| base.to_string())
    }
}

/// Short, file-name-safe id derived from a conversation id.
pub fn short_id(conversation_id: &str) -> String {
    let cleaned: String = conversation_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .take(SHORT_ID_LEN)
        .collect();
    let cleaned = cleaned.trim_start_matches(['-', '_']).to_string();
    if cleaned.is_empty() {
        "session".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::testing::FakeProcesses;
    use std::sync::{Arc, Mutex};
    use tempfile::{TempDir, tempdir};

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        changes: Arc<Mutex<Vec<StatusChange>>>,
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, change: &StatusChange) -> Result<()> {
            self.changes.lock().unwrap().push(change.clone());
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CountingUsage {
        refreshes: Arc<Mutex<u32>>,
    }

    impl UsageCache for CountingUsage {
        fn refresh(&self) -> Result<()> {
            *self.refreshes.lock().unwrap() += 1;
            Err(Error::Validation("refresh failures are logged only".to_string()))
        }
    }

    struct FixedTitle;

    impl TitleLookup for FixedTitle {
        fn title(&self, _record: &SessionRecord, _event: &HookEvent) -> Option<String> {
            Some("My conversation".to_string())
        }
    }

    fn names() -> Vec<String> {
        vec!["claude".to_string()]
    }

    fn setup(procs: FakeProcesses) -> (TempDir, Store, StatusEngine) {
        let temp = tempdir().unwrap();
        let store = Store::open(temp.path()).unwrap();
        let engine = StatusEngine::new(store.clone(), Box::new(procs), names());
        (temp, store, engine)
    }

    fn event(kind: &str, conversation: &str) -> HookEvent {
        HookEvent {
            hook_event_name: kind.to_string(),
            session_id: Some(conversation.to_string()),
            cwd: Some("/work/app".to_string()),
            ..Default::default()
        }
    }

    fn bound_record(store: &Store, id: &str, conversation: &str) -> SessionRecord {
        let mut r = SessionRecord::new(id, "/work/app");
        r.tmux_session = Some(format!("tend-{}", id));
        r.conversation_id = Some(conversation.to_string());
        store.save(&mut r).unwrap();
        r
    }

    #[test]
    fn test_bound_conversation_updates_status() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        bound_record(&store, "demo", "conv-1");

        let outcome = engine
            .ingest(&event("UserPromptSubmit", "conv-1"), &HookContext::default())
            .unwrap();
        assert_eq!(
            outcome,
            IngestOutcome::Updated {
                session_id: "demo".to_string(),
                previous: SessionStatus::Running,
                current: SessionStatus::Working,
                registered: false,
            }
        );
        assert_eq!(store.load("demo").unwrap().unwrap().status, SessionStatus::Working);
    }

    #[test]
    fn test_tool_events_record_tool_name() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        bound_record(&store, "demo", "conv-1");

        let mut ev = event("PreToolUse", "conv-1");
        ev.tool_name = Some("Edit".to_string());
        engine.ingest(&ev, &HookContext::default()).unwrap();

        let r = store.load("demo").unwrap().unwrap();
        assert_eq!(r.status, SessionStatus::Working);
        assert_eq!(r.detail.as_deref(), Some("Edit"));

        engine.ingest(&event("Stop", "conv-1"), &HookContext::default()).unwrap();
        let r = store.load("demo").unwrap().unwrap();
        assert_eq!(r.status, SessionStatus::Idle);
        assert_eq!(r.detail, None);
    }

    #[test]
    fn test_late_subagent_event_does_not_clobber_idle() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        bound_record(&store, "demo", "conv-1");
        let ctx = HookContext::default();

        engine.ingest(&event("UserPromptSubmit", "conv-1"), &ctx).unwrap();
        engine.ingest(&event("Stop", "conv-1"), &ctx).unwrap();
        let outcome = engine.ingest(&event("SubagentStart", "conv-1"), &ctx).unwrap();
        engine.ingest(&event("SubagentStop", "conv-1"), &ctx).unwrap();

        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(store.load("demo").unwrap().unwrap().status, SessionStatus::Idle);
    }

    #[test]
    fn test_unrecognized_event_leaves_status() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        bound_record(&store, "demo", "conv-1");

        let outcome = engine
            .ingest(&event("PreCompact", "conv-1"), &HookContext::default())
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Ignored);
        assert_eq!(store.load("demo").unwrap().unwrap().status, SessionStatus::Running);
    }

    #[test]
    fn test_propagated_session_id_binds_conversation() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        let mut r = SessionRecord::new("demo", "/work/app");
        store.save(&mut r).unwrap();

        let ctx = HookContext {
            session_id: Some("demo".to_string()),
            ..Default::default()
        };
        engine.ingest(&event("SessionStart", "conv-9"), &ctx).unwrap();

        let r = store.load("demo").unwrap().unwrap();
        assert_eq!(r.conversation_id.as_deref(), Some("conv-9"));
        assert_eq!(r.status, SessionStatus::Idle);
        // Subsequent events resolve through the binding alone.
        engine
            .ingest(&event("UserPromptSubmit", "conv-9"), &HookContext::default())
            .unwrap();
        assert_eq!(store.load("demo").unwrap().unwrap().status, SessionStatus::Working);
    }

    #[test]
    fn test_unbound_record_in_same_tmux_session_is_adopted() {
        let (_t, store, engine) = setup(FakeProcesses::default());
        let mut r = SessionRecord::new("demo", "/work/app");
        r.tmux_session = Some("tend-demo".to_string());
        store.save(&mut r).unwrap();

        let ctx = HookContext {
            tmux_session: Some("tend-demo".to_string()),
            ..Default::default()
        };
        let outcome = engine.ingest(&event("SessionStart", "conv-5"), &ctx).unwrap();

        assert!(matches!(outcome, IngestOutcome::Updated { ref session_id, registered: false, .. } if session_id == "demo"));
        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn test_auto_registration_walks_process_ancestry() {
        let procs = FakeProcesses::default()
            .with(100, 1, "tmux: server")
            .with(200, 100, "claude")
            .with(300, 200, "sh");
        let (_t, store, engine) = setup(procs);

        let ctx = HookContext {
            tmux_session: Some("work".to_string()),
            parent_pid: Some(300),
            ..Default::default()
        };
        let outcome = engine
            .ingest(&event("UserPromptSubmit", "8f2c1d3e-aaaa-bbbb"), &ctx)
            .unwrap();

        match outcome {
            IngestOutcome::Updated { session_id, registered, .. } => {
                assert_eq!(session_id, "8f2c1d3e");
                assert!(registered);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        let r = store.load("8f2c1d3e").unwrap().unwrap();
        assert!(r.auto_registered);
        assert_eq!(r.pid, Some(200));
        assert_eq!(r.tmux_session.as_deref(), Some("work"));
        assert_eq!(r.cwd, "/work/app");
        assert_eq!(r.status, SessionStatus::Working);
    }

    #[test]
    fn test_auto_registration_resolves_id_collisions() {
        let procs = FakeProcesses::default().with(200, 1, "claude");
        let (_t, store, engine) = setup(procs);
        bound_record(&store, "8f2c1d3e", "8f2c1d3e-other");

        let ctx = HookContext {
            parent_pid: Some(200),
            ..Default::default()
        };
        engine.ingest(&event("Stop", "8f2c1d3e-mine"), &ctx).unwrap();

        let r = store.load("8f2c1d3e-2").unwrap().unwrap();
        assert_eq!(r.conversation_id.as_deref(), Some("8f2c1d3e-mine"));
        assert_eq!(store.load("8f2c1d3e").unwrap().unwrap().status, SessionStatus::Running);
    }

    #[test]
    fn test_unresolvable_event_is_dropped() {
        let (_t, store, engine) = setup(FakeProcesses::default());

        let outcome = engine
            .ingest(&event("Stop", "conv-x"), &HookContext::default())
            .unwrap();
        assert_eq!(outcome, IngestOutcome::Unresolved);

        let mut no_conv = event("Stop", "");
        no_conv.session_id = None;
        let ctx = HookContext {
            tmux_session: Some("work".to_string()),
            ..Default::default()
        };
        assert_eq!(engine.ingest(&no_conv, &ctx).unwrap(), IngestOutcome::Unresolved);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_side_effects_on_transition() {
        let temp = tempdir().unwrap();
        let store = Store::open(temp.path()).unwrap();
        let notifier = RecordingNotifier::default();
        let usage = CountingUsage::default();
        let engine = StatusEngine::new(store.clone(), Box::new(FakeProcesses::default()), names())
            .with_titles(Box::new(FixedTitle))
            .with_notifier(Box::new(notifier.clone()))
            .with_usage_cache(Box::new(usage.clone()));
        bound_record(&store, "demo", "conv-1");
        let ctx = HookContext::default();

        engine.ingest(&event("UserPromptSubmit", "conv-1"), &ctx).unwrap();
        assert_eq!(*usage.refreshes.lock().unwrap(), 0);

        let mut perm = event("PermissionRequest", "conv-1");
        perm.tool_name = Some("Bash".to_string());
        engine.ingest(&perm, &ctx).unwrap();
        assert_eq!(*usage.refreshes.lock().unwrap(), 1);

        let changes = notifier.changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[1].previous, SessionStatus::Working);
        assert_eq!(changes[1].current, SessionStatus::AwaitingPermission);
        assert_eq!(changes[1].title.as_deref(), Some("My conversation"));
        assert_eq!(changes[1].detail.as_deref(), Some("Bash"));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("8f2c1d3e-aaaa-bbbb"), "8f2c1d3e");
        assert_eq!(short_id("ab/c"), "abc");
        assert_eq!(short_id("---"), "session");
        assert_eq!(short_id("-x"), "x");
    }
}
