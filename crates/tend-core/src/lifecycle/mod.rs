//! Session lifecycle: create, kill, prune, attach.
//!
//! The controller orchestrates the store, the reconciler, the multiplexer and
//! the inbox. It never caches records; every operation starts from disk.

mod attach;

pub use attach::AttachOutcome;

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::inbox::Inbox;
use crate::process::{ProcessTable, find_in_tree};
use crate::reconcile::{Liveness, Reconciler};
use crate::store::{Store, validate_id};
use crate::tmux::{CreateSessionConfig, Multiplexer};
use crate::types::{MessageKind, SessionRecord, SessionStatus};

/// Environment variable carrying the tend session id into spawned processes.
pub const SESSION_ENV: &str = "TEND_SESSION_ID";

const GENERATED_ID_LEN: usize = 8;

#[derive(Debug, Clone)]
pub struct ControllerSettings {
    /// Assistant program and leading arguments.
    pub agent_command: Vec<String>,
    /// Names the assistant process may run under.
    pub process_names: Vec<String>,
    /// Prefix for tmux session names.
    pub tmux_prefix: String,
    pub inbox_poll: Duration,
    pub pid_attempts: u32,
    pub pid_retry_delay: Duration,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            agent_command: vec!["claude".to_string()],
            process_names: vec!["claude".to_string()],
            tmux_prefix: "tend-".to_string(),
            inbox_poll: Duration::from_millis(250),
            pid_attempts: 5,
            pid_retry_delay: Duration::from_millis(200),
        }
    }
}

/// Parameters for a new session.
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub cwd: String,
    /// Conversation id to resume.
    pub resume: Option<String>,
    /// Explicit session id.
    pub label: Option<String>,
}

/// Which sessions `kill_targets` selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KillTarget {
    /// Exact id or unique prefix.
    Id(String),
    All,
    /// Sessions whose reconciled status is Idle.
    Idle,
}

pub struct Controller {
    store: Store,
    inbox: Inbox,
    mux: Arc<dyn Multiplexer>,
    procs: Arc<dyn ProcessTable>,
    settings: ControllerSettings,
}

impl Controller {
    pub fn new(
        store: Store,
        inbox: Inbox,
        mux: Arc<dyn Multiplexer>,
        procs: Arc<dyn ProcessTable>,
        settings: ControllerSettings,
    ) -> Self {
        Self {
            store,
            inbox,
            mux,
            procs,
            settings,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    pub fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn multiplexer(&self) -> &dyn Multiplexer {
        self.mux.as_ref()
    }

    fn reconciler(&self) -> Reconciler<'_> {
        Reconciler::new(self.mux.as_ref(), self.procs.as_ref())
    }

    /// tmux session name for a tend session id.
    pub fn tmux_name(&self, id: &str) -> String {
        format!("{}{}", self.settings.tmux_prefix, id)
    }

    /// Every record, reconciled, with new Exited transitions persisted.
    pub fn snapshot(&self) -> Result<Vec<SessionRecord>> {
        let mut records = self.store.list()?;
        let outcomes = self.reconciler().reconcile_all(&mut records);
        let persisted = Reconciler::persist_transitions(&self.store, &mut records, &outcomes);
        if persisted > 0 {
            debug!("Marked {} session(s) exited", persisted);
        }
        Ok(records)
    }

    /// Resolve a query and reconcile the record, persisting an Exited transition.
    pub fn lookup(&self, query: &str) -> Result<(SessionRecord, Liveness)> {
        let mut record = self.store.resolve(query)?;
        let outcome = self.reconciler().reconcile(&mut record);
        Reconciler::persist_transitions(
            &self.store,
            std::slice::from_mut(&mut record),
            std::slice::from_ref(&outcome),
        );
        Ok((record, outcome.liveness))
    }

    /// Reload and reconcile one record by exact id; `None` once it is gone.
    pub fn refresh(&self, id: &str) -> Result<Option<SessionRecord>> {
        let Some(mut record) = self.store.load(id)? else {
            return Ok(None);
        };
        let outcome = self.reconciler().reconcile(&mut record);
        Reconciler::persist_transitions(
            &self.store,
            std::slice::from_mut(&mut record),
            std::slice::from_ref(&outcome),
        );
        Ok(Some(record))
    }

    /// Start the assistant in a new detached tmux session.
    pub fn create(&self, request: CreateRequest) -> Result<SessionRecord> {
        self.mux.check_available()?;

        let id = self.choose_id(&request)?;
        let tmux_session = self.tmux_name(&id);

        let mut command = self.settings.agent_command.clone();
        if command.is_empty() {
            return Err(Error::Validation("agent command is empty".to_string()));
        }
        if let Some(conv) = request.resume.as_deref().filter(|c| !c.is_empty()) {
            command.push("--resume".to_string());
            command.push(conv.to_string());
        }

        let config = CreateSessionConfig {
            session_name: tmux_session.clone(),
            working_directory: Some(request.cwd.clone()).filter(|c| !c.is_empty()),
            command,
            env: HashMap::from([(SESSION_ENV.to_string(), id.clone())]),
        };
        self.mux.create_session(&config)?;

        let mut record = SessionRecord::new(id.clone(), request.cwd);
        record.tmux_session = Some(tmux_session.clone());
        record.conversation_id = request.resume.filter(|c| !c.is_empty());
        record.pid = self.discover_pid(&tmux_session);
        if let Err(e) = self.store.save(&mut record) {
            // Don't leave an untracked session behind.
            if let Err(kill_err) = self.mux.kill_session(&tmux_session) {
                warn!("Failed to kill untracked tmux session {}: {}", tmux_session, kill_err);
            }
            return Err(e);
        }

        info!("Created session {} in {}", id, record.cwd);
        Ok(record)
    }

    fn choose_id(&self, request: &CreateRequest) -> Result<String> {
        let id = if let Some(label) = request.label.as_deref().filter(|l| !l.is_empty()) {
            label.to_string()
        } else if let Some(conv) = request.resume.as_deref().filter(|c| !c.is_empty()) {
            conv.chars().take(GENERATED_ID_LEN).collect()
        } else {
            uuid::Uuid::new_v4().simple().to_string()[..GENERATED_ID_LEN].to_string()
        };
        validate_id(&id)?;
        if self.store.exists(&id) {
            return Err(Error::SessionExists(id));
        }
        Ok(id)
    }

    /// Find the assistant inside the pane's process tree, retrying while it starts.
    fn discover_pid(&self, tmux_session: &str) -> Option<u32> {
        for attempt in 0..self.settings.pid_attempts.max(1) {
            if attempt > 0 {
                std::thread::sleep(self.settings.pid_retry_delay);
            }
            match self.mux.pane_pid(tmux_session) {
                Ok(Some(pane)) => {
                    if let Some(pid) =
                        find_in_tree(self.procs.as_ref(), pane, &self.settings.process_names)
                    {
                        debug!("Found assistant pid {} in {}", pid, tmux_session);
                        return Some(pid);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("pane pid query for {} failed: {}", tmux_session, e),
            }
        }
        debug!("No assistant process found in {}", tmux_session);
        None
    }

    /// Records selected by a kill target, reconciled.
    pub fn kill_targets(&self, target: &KillTarget) -> Result<Vec<SessionRecord>> {
        match target {
            KillTarget::Id(query) => Ok(vec![self.lookup(query)?.0]),
            KillTarget::All => self.snapshot(),
            KillTarget::Idle => Ok(self
                .snapshot()?
                .into_iter()
                .filter(|r| r.status == SessionStatus::Idle)
                .collect()),
        }
    }

    /// Tear down the tmux session, delete the record and its inbox.
    pub fn kill(&self, record: &SessionRecord) -> Result<()> {
        if let Some(name) = &record.tmux_session {
            match self.mux.session_info(name) {
                Ok(Some(_)) => self.mux.kill_session(name)?,
                Ok(None) => debug!("tmux session {} already gone", name),
                Err(e) => debug!("tmux query for {} failed: {}", name, e),
            }
        }
        self.store.delete(&record.id)?;
        if let Err(e) = self.inbox.clear(&record.id) {
            warn!("Failed to clear inbox for {}: {}", record.id, e);
        }
        info!("Killed session {}", record.id);
        Ok(())
    }

    /// Delete Exited records not updated within `max_age`. Zero removes every
    /// Exited record. Returns the removed ids.
    ///
    /// Age is measured from the record's last write before this call, so a
    /// session found dead now is judged by when it was last active.
    pub fn prune(&self, max_age: ChronoDuration) -> Result<Vec<String>> {
        let Some(cutoff) = Utc::now().checked_sub_signed(max_age) else {
            debug!("Prune age {} reaches past the earliest date; nothing to prune", max_age);
            return Ok(Vec::new());
        };

        let mut records = self.store.list()?;
        let last_written: Vec<_> = records.iter().map(|r| r.updated_at).collect();
        let outcomes = self.reconciler().reconcile_all(&mut records);
        Reconciler::persist_transitions(&self.store, &mut records, &outcomes);

        let mut removed = Vec::new();
        for (record, last_written) in records.into_iter().zip(last_written) {
            if record.status != SessionStatus::Exited {
                continue;
            }
            if !max_age.is_zero() && last_written >= cutoff {
                continue;
            }
            match self.store.delete(&record.id) {
                Ok(_) => {
                    if let Err(e) = self.inbox.clear(&record.id) {
                        warn!("Failed to clear inbox for {}: {}", record.id, e);
                    }
                    removed.push(record.id);
                }
                Err(e) => warn!("Failed to prune {}: {}", record.id, e),
            }
        }
        if !removed.is_empty() {
            info!("Pruned {} exited session(s)", removed.len());
        }
        Ok(removed)
    }

    /// Detach every client from a session's tmux session.
    pub fn detach_clients(&self, query: &str) -> Result<SessionRecord> {
        let (record, liveness) = self.lookup(query)?;
        let Some(name) = record.tmux_session.as_deref().filter(|_| liveness == Liveness::Backed)
        else {
            return Err(Error::NotAlive(record.id));
        };
        self.mux.detach_clients(name)?;
        info!("Detached clients from {}", record.id);
        Ok(record)
    }

    /// Ask whoever is attached to a session to bring its terminal forward.
    pub fn focus(&self, query: &str) -> Result<SessionRecord> {
        let (record, _) = self.lookup(query)?;
        self.inbox.post(&record.id, MessageKind::Focus, "")?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{HookContext, HookEvent, IngestOutcome, StatusEngine};
    use crate::testing::{FakeMux, FakeProcesses};
    use tempfile::{TempDir, tempdir};

    struct Harness {
        _temp: TempDir,
        mux: Arc<FakeMux>,
        procs: Arc<FakeProcesses>,
        controller: Controller,
    }

    fn harness() -> Harness {
        harness_with(FakeMux::default())
    }

    fn harness_with(mux: FakeMux) -> Harness {
        let temp = tempdir().unwrap();
        let store = Store::open(temp.path().join("sessions")).unwrap();
        let inbox = Inbox::new(temp.path().join("inbox"));
        let mux = Arc::new(mux);
        let procs = Arc::new(FakeProcesses::default());
        let settings = ControllerSettings {
            pid_retry_delay: Duration::ZERO,
            ..Default::default()
        };
        let controller = Controller::new(store, inbox, mux.clone(), procs.clone(), settings);
        Harness {
            _temp: temp,
            mux,
            procs,
            controller,
        }
    }

    fn exited(h: &Harness, id: &str, age: ChronoDuration) {
        let mut r = SessionRecord::new(id, "/tmp");
        r.status = SessionStatus::Exited;
        r.updated_at = Utc::now() - age;
        // save never moves updated_at backwards, so write the file directly
        std::fs::write(
            h.controller.store().path_for(id),
            serde_json::to_string(&r).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_create_with_label() {
        let h = harness();
        *h.mux.next_pane_pid.lock().unwrap() = Some(500);
        h.procs.spawn(500, 1, "zsh");
        h.procs.spawn(501, 500, "claude");

        let record = h
            .controller
            .create(CreateRequest {
                cwd: "/work/app".to_string(),
                label: Some("demo".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(record.id, "demo");
        assert_eq!(record.status, SessionStatus::Running);
        assert_eq!(record.pid, Some(501));
        assert_eq!(record.tmux_session.as_deref(), Some("tend-demo"));

        let config = h.mux.created("tend-demo").unwrap();
        assert_eq!(config.command, vec!["claude".to_string()]);
        assert_eq!(config.working_directory.as_deref(), Some("/work/app"));
        assert_eq!(config.env.get(SESSION_ENV).map(String::as_str), Some("demo"));
        assert_eq!(h.controller.store().list().unwrap().len(), 1);
    }

    #[test]
    fn test_create_save_failure_removes_tmux_session() {
        let h = harness();
        let dir = h.controller.store().dir().to_path_buf();
        std::fs::remove_dir_all(&dir).unwrap();
        std::fs::write(&dir, "not a directory").unwrap();

        let result = h.controller.create(CreateRequest {
            cwd: "/tmp".to_string(),
            label: Some("orphan".to_string()),
            ..Default::default()
        });
        assert!(result.is_err());
        assert!(!h.mux.is_alive("tend-orphan"));
    }

    #[test]
    fn test_create_resume_binds_conversation() {
        let h = harness();
        let record = h
            .controller
            .create(CreateRequest {
                cwd: "/work".to_string(),
                resume: Some("8f2c1d3e-aaaa".to_string()),
                label: None,
            })
            .unwrap();

        assert_eq!(record.id, "8f2c1d3e");
        assert_eq!(record.conversation_id.as_deref(), Some("8f2c1d3e-aaaa"));
        assert_eq!(record.pid, None);
        let config = h.mux.created("tend-8f2c1d3e").unwrap();
        assert_eq!(config.command, vec!["claude", "--resume", "8f2c1d3e-aaaa"]);
    }

    #[test]
    fn test_create_generates_random_id() {
        let h = harness();
        let record = h
            .controller
            .create(CreateRequest {
                cwd: "/work".to_string(),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(record.id.len(), 8);
        assert!(record.id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_create_rejects_duplicate_and_missing_tmux() {
        let h = harness();
        let request = CreateRequest {
            cwd: "/work".to_string(),
            label: Some("demo".to_string()),
            ..Default::default()
        };
        h.controller.create(request.clone()).unwrap();
        assert!(matches!(
            h.controller.create(request.clone()),
            Err(Error::SessionExists(_))
        ));

        let bad = CreateRequest {
            label: Some("../x".to_string()),
            ..request.clone()
        };
        assert!(matches!(h.controller.create(bad), Err(Error::Validation(_))));

        let h2 = harness_with(FakeMux {
            available: false,
            ..Default::default()
        });
        assert!(matches!(h2.controller.create(request), Err(Error::TmuxNotFound)));
    }

    #[test]
    fn test_end_to_end_demo_session() {
        let h = harness();
        let record = h
            .controller
            .create(CreateRequest {
                cwd: "/work/app".to_string(),
                label: Some("demo".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(h.controller.store().list().unwrap().len(), 1);

        let engine = StatusEngine::new(
            h.controller.store().clone(),
            Box::new(FakeProcesses::default()),
            vec!["claude".to_string()],
        );
        let ctx = HookContext {
            session_id: Some(record.id.clone()),
            ..Default::default()
        };
        let event = |name: &str| HookEvent {
            hook_event_name: name.to_string(),
            session_id: Some("conv-demo".to_string()),
            ..Default::default()
        };

        engine.ingest(&event("UserPromptSubmit"), &ctx).unwrap();
        let (current, _) = h.controller.lookup("demo").unwrap();
        assert_eq!(current.status, SessionStatus::Working);
        assert_eq!(current.conversation_id.as_deref(), Some("conv-demo"));

        // Bound by conversation id from here on.
        let outcome = engine.ingest(&event("Stop"), &HookContext::default()).unwrap();
        assert!(matches!(outcome, IngestOutcome::Updated { current: SessionStatus::Idle, .. }));
        let (current, _) = h.controller.lookup("demo").unwrap();
        assert_eq!(current.status, SessionStatus::Idle);

        let targets = h.controller.kill_targets(&KillTarget::Id("demo".to_string())).unwrap();
        h.controller.kill(&targets[0]).unwrap();
        assert!(!h.controller.store().exists("demo"));
        assert!(!h.mux.is_alive("tend-demo"));
    }

    #[test]
    fn test_kill_clears_inbox_and_tolerates_dead_tmux() {
        let h = harness();
        let mut r = SessionRecord::new("gone", "/tmp");
        r.tmux_session = Some("tend-gone".to_string());
        h.controller.store().save(&mut r).unwrap();
        h.controller.inbox().post("gone", MessageKind::Focus, "").unwrap();

        h.controller.kill(&r).unwrap();
        assert!(!h.controller.store().exists("gone"));
        assert!(h.controller.inbox().pending("gone").unwrap().is_empty());
    }

    #[test]
    fn test_kill_targets_idle_and_all() {
        let h = harness();
        for (id, status) in [("a", SessionStatus::Idle), ("b", SessionStatus::Working)] {
            let mut r = SessionRecord::new(id, "/tmp");
            r.tmux_session = Some(format!("tend-{}", id));
            r.status = status;
            h.controller.store().save(&mut r).unwrap();
            h.mux.add_session(&format!("tend-{}", id), 0, None);
        }

        let idle = h.controller.kill_targets(&KillTarget::Idle).unwrap();
        assert_eq!(idle.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["a"]);
        assert_eq!(h.controller.kill_targets(&KillTarget::All).unwrap().len(), 2);
        assert!(matches!(
            h.controller.kill_targets(&KillTarget::Id("zzz".to_string())),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_prune_zero_removes_all_exited_only() {
        let h = harness();
        exited(&h, "old", ChronoDuration::days(30));
        exited(&h, "fresh", ChronoDuration::minutes(5));
        let mut live = SessionRecord::new("live", "/tmp");
        live.tmux_session = Some("tend-live".to_string());
        h.controller.store().save(&mut live).unwrap();
        h.mux.add_session("tend-live", 0, None);

        let mut removed = h.controller.prune(ChronoDuration::zero()).unwrap();
        removed.sort();
        assert_eq!(removed, vec!["fresh".to_string(), "old".to_string()]);
        assert!(h.controller.store().exists("live"));
    }

    #[test]
    fn test_prune_respects_max_age() {
        let h = harness();
        exited(&h, "old", ChronoDuration::days(30));
        exited(&h, "fresh", ChronoDuration::days(2));

        let removed = h.controller.prune(ChronoDuration::days(7)).unwrap();
        assert_eq!(removed, vec!["old".to_string()]);
        assert!(h.controller.store().exists("fresh"));
    }

    #[test]
    fn test_prune_age_beyond_calendar_keeps_everything() {
        let h = harness();
        exited(&h, "old", ChronoDuration::days(30));

        let removed = h.controller.prune(ChronoDuration::weeks(1_000_000_000)).unwrap();
        assert!(removed.is_empty());
        assert!(h.controller.store().exists("old"));
    }

    #[test]
    fn test_prune_judges_dead_session_by_last_activity() {
        let h = harness();
        let mut r = SessionRecord::new("stale", "/tmp");
        r.tmux_session = Some("tend-stale".to_string());
        r.updated_at = Utc::now() - ChronoDuration::days(30);
        std::fs::write(
            h.controller.store().path_for("stale"),
            serde_json::to_string(&r).unwrap(),
        )
        .unwrap();

        // Still recorded as running; the tmux session is long gone.
        let removed = h.controller.prune(ChronoDuration::days(7)).unwrap();
        assert_eq!(removed, vec!["stale".to_string()]);
        assert!(!h.controller.store().exists("stale"));
    }

    #[test]
    fn test_prune_marks_dead_sessions_exited() {
        let h = harness();
        let mut r = SessionRecord::new("dead", "/tmp");
        r.tmux_session = Some("tend-dead".to_string());
        h.controller.store().save(&mut r).unwrap();

        // Dead backing session is reconciled to Exited, then pruned at zero age.
        assert_eq!(h.controller.prune(ChronoDuration::zero()).unwrap(), vec!["dead"]);
    }

    #[test]
    fn test_detach_and_focus() {
        let h = harness();
        let mut r = SessionRecord::new("demo", "/tmp");
        r.tmux_session = Some("tend-demo".to_string());
        h.controller.store().save(&mut r).unwrap();
        h.mux.add_session("tend-demo", 2, None);

        h.controller.detach_clients("de").unwrap();
        assert_eq!(*h.mux.detached.lock().unwrap(), vec!["tend-demo".to_string()]);

        h.controller.focus("demo").unwrap();
        assert_eq!(h.controller.inbox().pending("demo").unwrap().len(), 1);

        h.mux.remove_session("tend-demo");
        assert!(matches!(h.controller.detach_clients("demo"), Err(Error::NotAlive(_))));
    }

    #[test]
    fn test_refresh_uses_exact_id() {
        let h = harness();
        let mut r = SessionRecord::new("abcd", "/tmp");
        r.tmux_session = Some("tend-abcd".to_string());
        h.controller.store().save(&mut r).unwrap();
        h.mux.add_session("tend-abcd", 1, None);

        // A prefix of a live id is not a match
        assert!(h.controller.refresh("abc").unwrap().is_none());

        let record = h.controller.refresh("abcd").unwrap().unwrap();
        assert_eq!(record.attached, 1);
        assert_eq!(record.status, SessionStatus::Running);

        h.mux.remove_session("tend-abcd");
        let record = h.controller.refresh("abcd").unwrap().unwrap();
        assert_eq!(record.status, SessionStatus::Exited);
        assert!(h.controller.store().load("abcd").unwrap().unwrap().is_exited());
    }
}
