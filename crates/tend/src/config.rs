//! Configuration management for tend.
//!
//! Configuration is loaded from multiple sources with precedence:
//! 1. Environment variables (TEND_CONFIG, TEND_DATA_DIR)
//! 2. Config file (<data_dir>/config.toml)
//! 3. Default values

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tend_core::ControllerSettings;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Paths
    pub paths: PathsConfig,

    /// Assistant settings
    pub agent: AgentConfig,

    /// Interactive monitor settings
    pub monitor: MonitorConfig,

    /// Inbox settings
    pub inbox: InboxConfig,

    /// External commands run on status changes
    pub hooks: HooksConfig,

    /// File this configuration was read from
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Base directory for tend data
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Session records; defaults to `<data_dir>/sessions`
    pub sessions_dir: Option<PathBuf>,

    /// Inbox channels; defaults to `<data_dir>/inbox`
    pub inbox_dir: Option<PathBuf>,

    /// Log files; defaults to `<data_dir>/logs`
    pub logs_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Program and leading arguments started in new sessions
    #[serde(default = "default_agent_command")]
    pub command: Vec<String>,

    /// Process names the assistant runs under
    #[serde(default = "default_process_names")]
    pub process_names: Vec<String>,

    /// tmux session name prefix
    #[serde(default = "default_tmux_prefix")]
    pub tmux_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Full refresh interval in milliseconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_ms: u64,

    /// Exited sessions older than this are pruned on quit (0 = all)
    #[serde(default)]
    pub prune_on_quit_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxConfig {
    /// Watcher poll interval in milliseconds
    #[serde(default = "default_inbox_poll")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Run on every status change, with TEND_* variables describing it
    pub notify_command: Option<String>,

    /// Run when a session starts waiting on the user
    pub usage_refresh_command: Option<String>,

    /// Run by the attached terminal when a focus message arrives
    pub focus_command: Option<String>,
}

// Default value functions
fn default_data_dir() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("dev", "tend", "tend") {
        proj_dirs.data_dir().to_path_buf()
    } else {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tend")
    }
}

fn default_agent_command() -> Vec<String> {
    vec!["claude".to_string()]
}

fn default_process_names() -> Vec<String> {
    vec!["claude".to_string()]
}

fn default_tmux_prefix() -> String {
    "tend-".to_string()
}

fn default_refresh_interval() -> u64 {
    2000
}

fn default_inbox_poll() -> u64 {
    250
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sessions_dir: None,
            inbox_dir: None,
            logs_dir: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: default_agent_command(),
            process_names: default_process_names(),
            tmux_prefix: default_tmux_prefix(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: default_refresh_interval(),
            prune_on_quit_secs: 0,
        }
    }
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_inbox_poll(),
        }
    }
}

impl PathsConfig {
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("sessions"))
    }

    pub fn inbox_dir(&self) -> PathBuf {
        self.inbox_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("inbox"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.logs_dir
            .clone()
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }
}

impl Config {
    /// Load configuration from file and environment.
    pub fn load() -> Result<Self> {
        let data_dir_override = std::env::var_os("TEND_DATA_DIR")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);
        let config_path = Self::config_path(data_dir_override.as_deref());

        let mut config = if config_path.exists() {
            let mut config = Self::from_file(&config_path)?;
            config.source = Some(config_path);
            config
        } else {
            Config::default()
        };
        if let Some(dir) = data_dir_override {
            config.paths.data_dir = dir;
        }

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the config file path.
    pub fn config_path(data_dir_override: Option<&Path>) -> PathBuf {
        if let Some(path) = std::env::var_os("TEND_CONFIG").filter(|v| !v.is_empty()) {
            PathBuf::from(path)
        } else {
            data_dir_override
                .map(Path::to_path_buf)
                .unwrap_or_else(default_data_dir)
                .join("config.toml")
        }
    }

    /// Lifecycle controller settings derived from this configuration.
    pub fn controller_settings(&self) -> ControllerSettings {
        ControllerSettings {
            agent_command: self.agent.command.clone(),
            process_names: self.agent.process_names.clone(),
            tmux_prefix: self.agent.tmux_prefix.clone(),
            inbox_poll: self.inbox_poll(),
            ..ControllerSettings::default()
        }
    }

    pub fn inbox_poll(&self) -> Duration {
        Duration::from_millis(self.inbox.poll_interval_ms.max(10))
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.monitor.refresh_interval_ms.max(100))
    }

    /// Ensure all required directories exist.
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.paths.data_dir)
            .context("Failed to create data directory")?;
        std::fs::create_dir_all(self.paths.sessions_dir())
            .context("Failed to create sessions directory")?;
        std::fs::create_dir_all(self.paths.inbox_dir())
            .context("Failed to create inbox directory")?;
        std::fs::create_dir_all(self.paths.logs_dir())
            .context("Failed to create logs directory")?;
        Ok(())
    }
}
