//! In-memory multiplexer and process table used by unit tests.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::process::ProcessTable;
use crate::tmux::{CreateSessionConfig, Multiplexer, TmuxSession};

#[derive(Default)]
pub struct FakeProcesses {
    procs: Mutex<HashMap<u32, (u32, String)>>,
}

impl FakeProcesses {
    pub fn with(self, pid: u32, parent: u32, name: &str) -> Self {
        self.spawn(pid, parent, name);
        self
    }

    pub fn spawn(&self, pid: u32, parent: u32, name: &str) {
        self.procs
            .lock()
            .unwrap()
            .insert(pid, (parent, name.to_string()));
    }

    pub fn exit(&self, pid: u32) {
        self.procs.lock().unwrap().remove(&pid);
    }
}

impl ProcessTable for FakeProcesses {
    fn is_alive(&self, pid: u32) -> bool {
        self.procs.lock().unwrap().contains_key(&pid)
    }

    fn parent(&self, pid: u32) -> Option<u32> {
        self.procs.lock().unwrap().get(&pid).map(|(p, _)| *p)
    }

    fn name(&self, pid: u32) -> Option<String> {
        self.procs.lock().unwrap().get(&pid).map(|(_, n)| n.clone())
    }

    fn children(&self, pid: u32) -> Vec<u32> {
        let mut children: Vec<u32> = self
            .procs
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, (parent, _))| *parent == pid)
            .map(|(child, _)| *child)
            .collect();
        children.sort_unstable();
        children
    }
}

#[derive(Debug, Clone)]
pub struct FakeSession {
    pub attached: u32,
    pub pane_pid: Option<u32>,
    pub config: CreateSessionConfig,
}

/// Multiplexer double. `attach_command` runs `sh -c <attach_script>`.
pub struct FakeMux {
    pub available: bool,
    pub sessions: Mutex<HashMap<String, FakeSession>>,
    /// Pane pid assigned to the next created session.
    pub next_pane_pid: Mutex<Option<u32>>,
    pub attach_script: String,
    pub detached: Mutex<Vec<String>>,
}

impl Default for FakeMux {
    fn default() -> Self {
        Self {
            available: true,
            sessions: Mutex::new(HashMap::new()),
            next_pane_pid: Mutex::new(None),
            attach_script: "exit 0".to_string(),
            detached: Mutex::new(Vec::new()),
        }
    }
}

impl FakeMux {
    pub fn add_session(&self, name: &str, attached: u32, pane_pid: Option<u32>) {
        self.sessions.lock().unwrap().insert(
            name.to_string(),
            FakeSession {
                attached,
                pane_pid,
                config: CreateSessionConfig {
                    session_name: name.to_string(),
                    ..Default::default()
                },
            },
        );
    }

    pub fn remove_session(&self, name: &str) {
        self.sessions.lock().unwrap().remove(name);
    }

    pub fn is_alive(&self, name: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(name)
    }

    pub fn created(&self, name: &str) -> Option<CreateSessionConfig> {
        self.sessions
            .lock()
            .unwrap()
            .get(name)
            .map(|s| s.config.clone())
    }
}

impl Multiplexer for FakeMux {
    fn check_available(&self) -> Result<()> {
        if self.available {
            Ok(())
        } else {
            Err(Error::TmuxNotFound)
        }
    }

    fn list_sessions(&self) -> Result<Vec<TmuxSession>> {
        let mut sessions: Vec<TmuxSession> = self
            .sessions
            .lock()
            .unwrap()
            .iter()
            .map(|(name, s)| TmuxSession {
                name: name.clone(),
                created: 0,
                attached: s.attached,
            })
            .collect();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }

    fn create_session(&self, config: &CreateSessionConfig) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&config.session_name) {
            return Err(Error::Tmux(format!(
                "Session already exists: {}",
                config.session_name
            )));
        }
        let pane_pid = self.next_pane_pid.lock().unwrap().take();
        sessions.insert(
            config.session_name.clone(),
            FakeSession {
                attached: 0,
                pane_pid,
                config: config.clone(),
            },
        );
        Ok(())
    }

    fn kill_session(&self, name: &str) -> Result<()> {
        match self.sessions.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(name.to_string())),
        }
    }

    fn pane_pid(&self, name: &str) -> Result<Option<u32>> {
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .get(name)
            .and_then(|s| s.pane_pid))
    }

    fn detach_clients(&self, name: &str) -> Result<()> {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(name) {
            session.attached = 0;
        }
        self.detached.lock().unwrap().push(name.to_string());
        Ok(())
    }

    fn attach_command(&self, _name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new("sh");
        cmd.args(["-c", &self.attach_script]);
        cmd
    }
}
