//! New session command.

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use std::process::ExitCode;

use tend_core::CreateRequest;

use crate::cli::NewArgs;
use crate::config::Config;

pub async fn execute(args: NewArgs, config: &Config) -> Result<ExitCode> {
    let cwd = match args.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    let cwd = resolve_dir(&cwd)?;

    let controller = super::controller(config)?;
    let record = controller.create(CreateRequest {
        cwd,
        resume: args.resume,
        label: args.label,
    })?;

    println!("{} Session {} started", "✓".green(), record.id.bold());
    println!("  cwd:  {}", record.cwd);
    if let Some(tmux) = &record.tmux_session {
        println!("  tmux: {}", tmux);
    }

    if args.detach {
        println!();
        println!("  Run `tend attach {}` to connect", record.id);
        return Ok(ExitCode::SUCCESS);
    }

    super::attach::execute(&record.id, false, config).await
}

pub fn resolve_dir(dir: &Path) -> Result<String> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("No such directory: {}", dir.display()))?;
    if !dir.is_dir() {
        anyhow::bail!("Not a directory: {}", dir.display());
    }
    Ok(dir.to_string_lossy().to_string())
}
