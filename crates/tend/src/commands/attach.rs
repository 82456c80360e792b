//! Attach command.

use anyhow::Result;
use colored::Colorize;
use dialoguer::{Select, theme::ColorfulTheme};
use std::io::{IsTerminal, Write};
use std::process::ExitCode;
use tracing::warn;

use tend_core::hooks::spawn_detached;
use tend_core::lifecycle::{AttachOutcome, SESSION_ENV};
use tend_core::types::{InboxMessage, MessageKind};
use tend_core::{Controller, Error};

use crate::config::Config;

pub async fn execute(session: &str, force: bool, config: &Config) -> Result<ExitCode> {
    let controller = super::controller(config)?;

    match attach_session(&controller, config, session, force).await {
        Ok(outcome) => Ok(exit_code(&outcome)),
        Err(Error::AlreadyAttached { id, clients }) if std::io::stdin().is_terminal() => {
            let choices = [
                "Take over (detach the other client)",
                "Bring the other terminal to the front",
                "Cancel",
            ];
            let choice = Select::with_theme(&ColorfulTheme::default())
                .with_prompt(format!("{} already has {} client(s) attached", id, clients))
                .items(&choices)
                .default(0)
                .interact()?;
            match choice {
                0 => {
                    let outcome = attach_session(&controller, config, &id, true).await?;
                    Ok(exit_code(&outcome))
                }
                1 => {
                    controller.focus(&id)?;
                    println!("{} Focus request sent to {}", "✓".green(), id);
                    Ok(ExitCode::SUCCESS)
                }
                _ => Ok(ExitCode::SUCCESS),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Attach the terminal, handling inbox messages until the client detaches.
pub async fn attach_session(
    controller: &Controller,
    config: &Config,
    query: &str,
    force: bool,
) -> tend_core::Result<AttachOutcome> {
    let focus_command = config.hooks.focus_command.clone();
    controller
        .attach(query, force, move |message| {
            handle_message(focus_command.as_deref(), &message)
        })
        .await
}

fn handle_message(focus_command: Option<&str>, message: &InboxMessage) {
    match message.kind {
        MessageKind::Focus => match focus_command {
            Some(command) => {
                let env = [(SESSION_ENV, message.session_id.clone())];
                if let Err(e) = spawn_detached(command, &env) {
                    warn!("Focus command failed: {}", e);
                }
            }
            None => {
                // Bell on the attached terminal.
                let mut stderr = std::io::stderr();
                let _ = stderr.write_all(b"\x07");
                let _ = stderr.flush();
            }
        },
    }
}

fn exit_code(outcome: &AttachOutcome) -> ExitCode {
    match outcome.status.code() {
        Some(0) => ExitCode::SUCCESS,
        Some(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        None => ExitCode::FAILURE,
    }
}
