//! tend - coordinate long-running assistant sessions hosted in tmux
//!
//! Tracks every assistant session's liveness and conversational state, ingests
//! hook events from the assistant, and drives an interactive monitor for
//! browsing, attaching and killing sessions.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cli;
mod commands;
mod config;
mod display;
mod error;
mod monitor;

use cli::{Cli, Commands};
use config::Config;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!("Command failed: {:#}", e);
            error::report(&e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    // Load configuration. A broken config must not fail the assistant's hooks.
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) if matches!(cli.command, Some(Commands::Hook)) => {
            eprintln!("tend: {:#}; using defaults", e);
            Config::default()
        }
        Err(e) => return Err(e),
    };

    // stdout belongs to the TUI or to the assistant running the hook
    match &cli.command {
        None => init_file_logging(&config, "monitor.log")?,
        Some(Commands::Hook) => {
            if init_file_logging(&config, "hook.log").is_err() {
                init_stderr_logging()?;
            }
        }
        Some(_) => init_stderr_logging()?,
    }

    // Execute command
    match cli.command {
        None => monitor::run(&config).await,
        Some(Commands::New(args)) => commands::new::execute(args, &config).await,
        Some(Commands::Ls { json }) => commands::ls::execute(json, &config).await.map(ok),
        Some(Commands::Attach { session, force }) => {
            commands::attach::execute(&session, force, &config).await
        }
        Some(Commands::Kill(args)) => commands::kill::execute(args, &config).await.map(ok),
        Some(Commands::Prune { max_age, all }) => {
            commands::prune::execute(&max_age, all, &config).await.map(ok)
        }
        Some(Commands::Hook) => Ok(commands::hook::execute(&config)),
        Some(Commands::Focus { session }) => {
            commands::focus::execute(session, &config).await.map(ok)
        }
        Some(Commands::Doctor) => commands::doctor::execute(&config).await.map(ok),
        Some(Commands::Version) => {
            println!("tend {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn ok(_: ()) -> ExitCode {
    ExitCode::SUCCESS
}

fn env_filter() -> Result<EnvFilter> {
    Ok(EnvFilter::from_default_env()
        .add_directive("tend=info".parse()?)
        .add_directive("tend_core=info".parse()?))
}

fn init_stderr_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter()?)
        .try_init()?;
    Ok(())
}

fn init_file_logging(config: &Config, name: &str) -> Result<()> {
    let dir = config.paths.logs_dir();
    std::fs::create_dir_all(&dir).context("Failed to create logs directory")?;
    let file = open_log(&dir.join(name))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .with(env_filter()?)
        .try_init()?;
    Ok(())
}

fn open_log(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
