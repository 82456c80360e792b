//! Interactive session monitor.
//!
//! The monitor browses sessions until the user picks an action that needs the
//! terminal (attach, create). It then restores the terminal, performs the
//! action and re-enters with the same view.

mod events;
mod input;
mod render;
mod state;

use anyhow::{Context, Result};
use crossterm::{
    event::{Event, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::io::{self, Stdout};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use tend_core::{Controller, CreateRequest, Error};

use crate::commands;
use crate::config::Config;
use events::{MonitorEvent, Producers, Refresher};
use input::Action;
use state::{App, ViewState};

const EVENT_BUFFER: usize = 256;

/// Why the browsing loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorExit {
    Attach { id: String, force: bool },
    /// Ask the already-attached terminal to come forward.
    Focus { id: String },
    /// New session in the current directory.
    Create,
    Quit,
}

pub async fn run(config: &Config) -> Result<ExitCode> {
    let controller = Arc::new(commands::controller(config)?);
    let mut view = ViewState::default();
    let mut notice = None;

    loop {
        let (exit, next) = browse(controller.clone(), config, view, notice.take()).await?;
        view = next;
        debug!("Monitor exit: {:?}", exit);

        match exit {
            MonitorExit::Quit => {
                prune_on_quit(controller, config).await;
                return Ok(ExitCode::SUCCESS);
            }
            MonitorExit::Attach { id, force } => {
                notice = attach(&controller, config, &id, force).await;
            }
            MonitorExit::Focus { id } => {
                notice = Some(match controller.focus(&id) {
                    Ok(record) => format!("Focus request sent to {}", record.id),
                    Err(e) => e.to_string(),
                });
            }
            MonitorExit::Create => match create(controller.clone()).await {
                Ok(id) => {
                    view.cursor_id = Some(id.clone());
                    notice = attach(&controller, config, &id, false).await;
                }
                Err(e) => notice = Some(format!("{:#}", e)),
            },
        }
    }
}

/// Attach and return a message for the monitor, if any.
async fn attach(controller: &Controller, config: &Config, id: &str, force: bool) -> Option<String> {
    match commands::attach::attach_session(controller, config, id, force).await {
        Ok(outcome) if outcome.status.success() => None,
        Ok(outcome) => Some(format!("{}: attach ended with {}", outcome.session_id, outcome.status)),
        Err(Error::AlreadyAttached { id, clients }) => Some(format!(
            "{} gained {} client(s) meanwhile; press enter again to take over",
            id, clients
        )),
        Err(e) => Some(e.to_string()),
    }
}

async fn create(controller: Arc<Controller>) -> Result<String> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let cwd = commands::new::resolve_dir(&cwd)?;
    let record = tokio::task::spawn_blocking(move || {
        controller.create(CreateRequest {
            cwd,
            ..Default::default()
        })
    })
    .await??;
    info!("Created session {} from the monitor", record.id);
    Ok(record.id)
}

async fn prune_on_quit(controller: Arc<Controller>, config: &Config) {
    let max_age = i64::try_from(config.monitor.prune_on_quit_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX);
    match tokio::task::spawn_blocking(move || controller.prune(max_age)).await {
        Ok(Ok(removed)) => debug!("Pruned on quit: {:?}", removed),
        Ok(Err(e)) => debug!("Prune on quit failed: {}", e),
        Err(e) => debug!("Prune task failed: {}", e),
    }
}

/// Raw mode and the alternate screen, restored on drop.
struct Screen {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Screen {
    fn enter() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        if let Err(e) = execute!(stdout, EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e.into());
        }
        let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
        terminal.clear()?;
        Ok(Self { terminal })
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the browsing loop until an exit action.
async fn browse(
    controller: Arc<Controller>,
    config: &Config,
    view: ViewState,
    notice: Option<String>,
) -> Result<(MonitorExit, ViewState)> {
    let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
    let mut app = App::new(view);
    app.notice = notice;

    let mut refresher = Refresher::new(controller.clone(), tx.clone());
    refresher.full();

    let mut screen = Screen::enter()?;
    let producers = Producers::start(controller.store().dir(), config.refresh_interval(), tx);

    let exit = loop {
        screen.terminal.draw(|frame| render::render(frame, &app))?;

        let Some(event) = rx.recv().await else {
            break MonitorExit::Quit;
        };
        match event {
            MonitorEvent::Tick => refresher.full(),
            MonitorEvent::StoreChanged(id) => refresher.one(id),
            MonitorEvent::Refreshed(result) => {
                refresher.full_done();
                match result {
                    Ok(records) => app.set_records(records),
                    Err(e) => {
                        warn!("Refresh failed: {}", e);
                        app.notice = Some(format!("refresh failed: {}", e));
                    }
                }
            }
            MonitorEvent::RecordRefreshed { id, record } => app.update_record(&id, record),
            MonitorEvent::ActionDone(message) => {
                app.notice = Some(message);
                refresher.full();
            }
            MonitorEvent::Input(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                match input::handle_key(&mut app, key) {
                    Action::None => {}
                    Action::Refresh => refresher.full(),
                    Action::Kill(id) => refresher.action(move |c| kill(c, &id)),
                    Action::Detach(id) => refresher.action(move |c| match c.detach_clients(&id) {
                        Ok(record) => format!("Detached clients from {}", record.id),
                        Err(e) => e.to_string(),
                    }),
                    Action::Exit(exit) => break exit,
                }
            }
            // Resize and other input only need a redraw
            MonitorEvent::Input(_) => {}
        }
    };

    // Stop reading the terminal before handing it to tmux.
    drop(producers);
    drop(screen);
    Ok((exit, app.into_view()))
}

fn kill(controller: &Controller, id: &str) -> String {
    let record = match controller.lookup(id) {
        Ok((record, _)) => record,
        Err(e) => return e.to_string(),
    };
    match controller.kill(&record) {
        Ok(()) => format!("Killed {}", record.id),
        Err(e) => format!("Failed to kill {}: {}", record.id, e),
    }
}
