//! tmux integration for session management.
//!
//! Provides the [`Multiplexer`] seam used by the reconciler and lifecycle
//! controller, and its tmux-backed implementation:
//! - Session creation, listing and teardown
//! - Attached-client counts and client detach
//! - Pane process discovery
//! - Hosting-session detection for hook invocations

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::process::{Command, Output};
use tracing::debug;

/// Terminal multiplexer operations consumed by tend.
pub trait Multiplexer: Send + Sync {
    /// Fail with [`Error::TmuxNotFound`] when the multiplexer is unavailable.
    fn check_available(&self) -> Result<()>;

    /// All live sessions. No server running is an empty list, not an error.
    fn list_sessions(&self) -> Result<Vec<TmuxSession>>;

    /// Info for one session, `None` when it does not exist.
    fn session_info(&self, name: &str) -> Result<Option<TmuxSession>> {
        Ok(self.list_sessions()?.into_iter().find(|s| s.name == name))
    }

    fn create_session(&self, config: &CreateSessionConfig) -> Result<()>;

    fn kill_session(&self, name: &str) -> Result<()>;

    /// Process id of the first pane's initial process.
    fn pane_pid(&self, name: &str) -> Result<Option<u32>>;

    /// Detach every client currently attached to the session.
    fn detach_clients(&self, name: &str) -> Result<()>;

    /// Command that attaches the current terminal to the session.
    fn attach_command(&self, name: &str) -> tokio::process::Command;
}

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// Session information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxSession {
    pub name: String,
    pub created: i64,
    /// Number of attached clients.
    pub attached: u32,
}

/// Configuration for creating a new session.
#[derive(Debug, Clone, Default)]
pub struct CreateSessionConfig {
    pub session_name: String,
    pub working_directory: Option<String>,
    /// Program and arguments run in the first pane.
    pub command: Vec<String>,
    /// Environment variables set for the initial process
    pub env: HashMap<String, String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// tmux implementation
// ─────────────────────────────────────────────────────────────────────────────

/// The real tmux binary.
#[derive(Debug, Clone)]
pub struct Tmux {
    program: String,
}

impl Default for Tmux {
    fn default() -> Self {
        Self {
            program: "tmux".to_string(),
        }
    }
}

impl Tmux {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&self, args: &[&str]) -> Result<Output> {
        debug!("tmux {}", args.join(" "));
        Ok(Command::new(&self.program).args(args).output()?)
    }

    fn run_checked(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Tmux(format!("{} failed: {}", args[0], stderr.trim())));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Check if a tmux session exists.
    pub fn session_exists(&self, session_name: &str) -> Result<bool> {
        let target = exact_target(session_name);
        let output = self.run(&["has-session", "-t", &target])?;
        Ok(output.status.success())
    }

    /// Name of the tmux session hosting the calling process, if any.
    ///
    /// `tmux_env` is the value of `$TMUX` at the process boundary.
    pub fn current_session(&self, tmux_env: Option<&str>) -> Option<String> {
        tmux_env.filter(|v| !v.is_empty())?;
        let output = self.run(&["display-message", "-p", "#S"]).ok()?;
        if !output.status.success() {
            return None;
        }
        let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if name.is_empty() { None } else { Some(name) }
    }
}

impl Multiplexer for Tmux {
    fn check_available(&self) -> Result<()> {
        match which::which(&self.program) {
            Ok(path) => {
                debug!("Found tmux at: {:?}", path);
                Ok(())
            }
            Err(_) => Err(Error::TmuxNotFound),
        }
    }

    fn list_sessions(&self) -> Result<Vec<TmuxSession>> {
        let output = self.run(&[
            "list-sessions",
            "-F",
            "#{session_created}\t#{session_attached}\t#{session_name}",
        ])?;

        if !output.status.success() {
            // No sessions is not an error
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running")
                || stderr.contains("no sessions")
                || stderr.contains("error connecting")
            {
                return Ok(Vec::new());
            }
            return Err(Error::Tmux(stderr.to_string()));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(parse_session_list(&stdout))
    }

    fn session_info(&self, name: &str) -> Result<Option<TmuxSession>> {
        if !self.session_exists(name)? {
            return Ok(None);
        }
        Ok(self.list_sessions()?.into_iter().find(|s| s.name == name))
    }

    fn create_session(&self, config: &CreateSessionConfig) -> Result<()> {
        if self.session_exists(&config.session_name)? {
            return Err(Error::Tmux(format!(
                "Session already exists: {}",
                config.session_name
            )));
        }

        let mut args: Vec<String> = vec![
            "new-session".into(),
            "-d".into(),
            "-s".into(),
            config.session_name.clone(),
        ];

        // Set working directory
        if let Some(ref cwd) = config.working_directory {
            args.push("-c".into());
            args.push(cwd.clone());
        }

        // -e applies to the initial process, unlike set-environment
        let mut env: Vec<_> = config.env.iter().collect();
        env.sort();
        for (key, value) in env {
            args.push("-e".into());
            args.push(format!("{}={}", key, value));
        }

        args.extend(config.command.iter().cloned());

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_checked(&arg_refs)?;

        debug!("Created tmux session: {}", config.session_name);
        Ok(())
    }

    fn kill_session(&self, session_name: &str) -> Result<()> {
        if !self.session_exists(session_name)? {
            return Err(Error::NotFound(session_name.to_string()));
        }
        let target = exact_target(session_name);
        self.run_checked(&["kill-session", "-t", &target])?;
        debug!("Killed tmux session: {}", session_name);
        Ok(())
    }

    fn pane_pid(&self, session_name: &str) -> Result<Option<u32>> {
        let target = exact_target(session_name);
        let stdout = self.run_checked(&["list-panes", "-t", &target, "-F", "#{pane_pid}"])?;
        Ok(stdout.lines().next().and_then(|l| l.trim().parse().ok()))
    }

    fn detach_clients(&self, session_name: &str) -> Result<()> {
        let target = exact_target(session_name);
        self.run_checked(&["detach-client", "-s", &target])?;
        debug!("Detached clients from tmux session: {}", session_name);
        Ok(())
    }

    fn attach_command(&self, session_name: &str) -> tokio::process::Command {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(["attach-session", "-t", &exact_target(session_name)]);
        cmd
    }
}

/// `=name` makes tmux match the session name exactly instead of by prefix.
fn exact_target(session_name: &str) -> String {
    format!("={}", session_name)
}

fn parse_session_list(stdout: &str) -> Vec<TmuxSession> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\t');
            let created = parts.next()?.parse().unwrap_or(0);
            let attached = parts.next()?.parse().unwrap_or(0);
            let name = parts.next()?;
            if name.is_empty() {
                return None;
            }
            Some(TmuxSession {
                name: name.to_string(),
                created,
                attached,
            })
        })
        .collect()
}
