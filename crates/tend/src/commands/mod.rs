//! Command implementations for the tend CLI.
//!
//! Each submodule implements one subcommand. They share the session
//! controller built here from the loaded configuration.

pub mod attach;
pub mod doctor;
pub mod focus;
pub mod hook;
pub mod kill;
pub mod ls;
pub mod new;
pub mod prune;

use anyhow::{Context, Result};
use std::sync::Arc;

use tend_core::process::SystemProcesses;
use tend_core::tmux::Tmux;
use tend_core::{Controller, Inbox, Store};

use crate::config::Config;

/// Build the lifecycle controller over the real tmux and process table.
pub fn controller(config: &Config) -> Result<Controller> {
    config.ensure_dirs()?;
    let store = Store::open(config.paths.sessions_dir()).context("Failed to open session store")?;
    let inbox = Inbox::new(config.paths.inbox_dir());
    Ok(Controller::new(
        store,
        inbox,
        Arc::new(Tmux::new()),
        Arc::new(SystemProcesses::new()),
        config.controller_settings(),
    ))
}
