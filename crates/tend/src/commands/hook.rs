//! Hook ingestion command.
//!
//! Runs inside the assistant's hook mechanism, so it must never block or fail
//! the assistant: only a malformed payload yields a non-zero exit. Everything
//! else is logged to `<logs_dir>/hook.log`.

use std::process::ExitCode;
use tracing::{debug, error, warn};

use tend_core::hooks::{
    CommandNotifier, CommandUsageCache, HookContext, HookEvent, IngestOutcome, LogNotifier,
    StatusEngine,
};
use tend_core::lifecycle::SESSION_ENV;
use tend_core::process::SystemProcesses;
use tend_core::tmux::Tmux;
use tend_core::Store;

use crate::config::Config;

pub fn execute(config: &Config) -> ExitCode {
    let event = match HookEvent::from_reader(std::io::stdin().lock()) {
        Ok(event) => event,
        Err(e) => {
            error!("Rejected hook payload: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let ctx = context_from_env();
    match ingest(&event, &ctx, config) {
        Ok(IngestOutcome::Updated {
            session_id,
            previous,
            current,
            ..
        }) => debug!("{} {}: {} -> {}", event.hook_event_name, session_id, previous, current),
        Ok(outcome) => debug!("{}: {:?}", event.hook_event_name, outcome),
        Err(e) => warn!("Hook {} not applied: {:#}", event.hook_event_name, e),
    }
    ExitCode::SUCCESS
}

fn ingest(event: &HookEvent, ctx: &HookContext, config: &Config) -> anyhow::Result<IngestOutcome> {
    let store = Store::open(config.paths.sessions_dir())?;
    Ok(engine(store, config).ingest(event, ctx)?)
}

fn engine(store: Store, config: &Config) -> StatusEngine {
    let mut engine = StatusEngine::new(
        store,
        Box::new(SystemProcesses::new()),
        config.agent.process_names.clone(),
    );
    engine = match &config.hooks.notify_command {
        Some(cmd) => engine.with_notifier(Box::new(CommandNotifier::new(cmd))),
        None => engine.with_notifier(Box::new(LogNotifier)),
    };
    if let Some(cmd) = &config.hooks.usage_refresh_command {
        engine = engine.with_usage_cache(Box::new(CommandUsageCache::new(cmd)));
    }
    engine
}

/// Facts about this invocation, read once at the process boundary.
fn context_from_env() -> HookContext {
    let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    HookContext {
        session_id: non_empty(SESSION_ENV),
        tmux_session: Tmux::new().current_session(non_empty("TMUX").as_deref()),
        parent_pid: Some(std::os::unix::process::parent_id()),
        cwd: std::env::current_dir()
            .ok()
            .map(|d| d.to_string_lossy().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tend_core::{SessionRecord, SessionStatus};
    use tempfile::tempdir;

    fn config_in(dir: &std::path::Path) -> Config {
        let mut config = Config::default();
        config.paths.data_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_ingest_updates_bound_session() {
        let temp = tempdir().unwrap();
        let config = config_in(temp.path());
        let store = Store::open(config.paths.sessions_dir()).unwrap();
        let mut record = SessionRecord::new("demo", "/work");
        record.conversation_id = Some("conv-1".to_string());
        store.save(&mut record).unwrap();

        let event = HookEvent::from_reader(
            r#"{"session_id":"conv-1","hook_event_name":"UserPromptSubmit"}"#.as_bytes(),
        )
        .unwrap();
        let outcome = ingest(&event, &HookContext::default(), &config).unwrap();

        assert!(matches!(outcome, IngestOutcome::Updated { .. }));
        assert_eq!(store.load("demo").unwrap().unwrap().status, SessionStatus::Working);
    }

    #[test]
    fn test_unknown_conversation_is_not_an_error() {
        let temp = tempdir().unwrap();
        let config = config_in(temp.path());
        let event = HookEvent::from_reader(
            r#"{"session_id":"conv-x","hook_event_name":"Stop"}"#.as_bytes(),
        )
        .unwrap();

        let outcome = ingest(&event, &HookContext::default(), &config).unwrap();
        assert_eq!(outcome, IngestOutcome::Unresolved);
    }
}
