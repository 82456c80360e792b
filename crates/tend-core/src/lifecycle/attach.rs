//! Attaching the current terminal to a session.

use std::process::ExitStatus;
use tokio::process::Child;
use tokio::signal::unix::{Signal, SignalKind, signal};
use tracing::{debug, info};

use super::{Controller, SESSION_ENV};
use crate::error::{Error, Result};
use crate::reconcile::Liveness;
use crate::types::InboxMessage;

#[derive(Debug)]
pub struct AttachOutcome {
    pub session_id: String,
    /// Exit status of the `tmux attach-session` child.
    pub status: ExitStatus,
}

impl Controller {
    /// Attach to a live session and block until the client detaches.
    ///
    /// Inbox messages for the session go to `on_message` while attached. A
    /// session that already has clients is refused unless `force` is set, in
    /// which case those clients are detached first.
    pub async fn attach<F>(&self, query: &str, force: bool, on_message: F) -> Result<AttachOutcome>
    where
        F: FnMut(InboxMessage) + Send + 'static,
    {
        self.mux.check_available()?;
        let (record, liveness) = self.lookup(query)?;
        let tmux_session = match (liveness, record.tmux_session.as_deref()) {
            (Liveness::Backed, Some(name)) => name.to_string(),
            _ => return Err(Error::NotAlive(record.id)),
        };

        if record.attached > 0 {
            if !force {
                return Err(Error::AlreadyAttached {
                    id: record.id,
                    clients: record.attached,
                });
            }
            debug!("Detaching {} client(s) from {}", record.attached, tmux_session);
            self.mux.detach_clients(&tmux_session)?;
        }

        // Register before spawning so a failure cannot leave an unwaited child.
        let mut signals = ForwardedSignals::register()?;
        let mut command = self.mux.attach_command(&tmux_session);
        command.env(SESSION_ENV, &record.id).kill_on_drop(true);
        let mut child = command.spawn().map_err(|e| {
            Error::command_failed(format!("tmux attach-session -t {}", tmux_session), e.to_string())
        })?;
        info!("Attached to {}", record.id);

        let watcher = self
            .inbox
            .watch(&record.id, self.settings.inbox_poll, on_message);
        let status = signals.wait(&mut child).await;
        watcher.shutdown().await;
        let status = status?;

        info!("Detached from {} ({})", record.id, status);
        Ok(AttachOutcome {
            session_id: record.id,
            status,
        })
    }
}

/// SIGINT, SIGTERM and SIGHUP streams relayed to the attach client.
struct ForwardedSignals {
    interrupt: Signal,
    terminate: Signal,
    hangup: Signal,
}

impl ForwardedSignals {
    fn register() -> Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    /// Wait for `child`, relaying signals to it meanwhile.
    async fn wait(&mut self, child: &mut Child) -> Result<ExitStatus> {
        let pid = child.id();
        loop {
            tokio::select! {
                status = child.wait() => return Ok(status?),
                _ = self.interrupt.recv() => forward(pid, libc::SIGINT),
                _ = self.terminate.recv() => forward(pid, libc::SIGTERM),
                _ = self.hangup.recv() => forward(pid, libc::SIGHUP),
            }
        }
    }
}

fn forward(pid: Option<u32>, sig: libc::c_int) {
    let Some(pid) = pid.and_then(|p| i32::try_from(p).ok()) else {
        return;
    };
    debug!("Forwarding signal {} to {}", sig, pid);
    unsafe {
        libc::kill(pid, sig);
    }
}
