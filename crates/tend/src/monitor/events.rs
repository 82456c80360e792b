//! Event producers feeding the monitor loop.
//!
//! Every source pushes into one `mpsc` channel. Refresh work runs on the
//! blocking pool and reports back as an event.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::Sender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use tend_core::store::Store;
use tend_core::{Controller, SessionRecord};

#[derive(Debug)]
pub enum MonitorEvent {
    /// Periodic fallback refresh.
    Tick,
    /// A record file changed on disk.
    StoreChanged(String),
    Input(Event),
    Refreshed(Result<Vec<SessionRecord>, String>),
    RecordRefreshed {
        id: String,
        record: Option<SessionRecord>,
    },
    /// A kill or detach finished; carries the message to show.
    ActionDone(String),
}

/// Background producers, stopped when dropped.
pub struct Producers {
    tasks: Vec<JoinHandle<()>>,
    _watcher: Option<RecommendedWatcher>,
}

impl Producers {
    pub fn start(store_dir: &Path, interval: Duration, tx: Sender<MonitorEvent>) -> Self {
        let watcher = match watch_store(store_dir, tx.clone()) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!("Store watcher unavailable, relying on periodic refresh: {}", e);
                None
            }
        };
        Self {
            tasks: vec![spawn_ticker(tx.clone(), interval), spawn_input(tx)],
            _watcher: watcher,
        }
    }
}

impl Drop for Producers {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_ticker(tx: Sender<MonitorEvent>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; the driver already refreshed.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if tx.send(MonitorEvent::Tick).await.is_err() {
                break;
            }
        }
    })
}

fn spawn_input(tx: Sender<MonitorEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(event) => {
                    if tx.send(MonitorEvent::Input(event)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Terminal input error: {}", e);
                    break;
                }
            }
        }
    })
}

fn watch_store(dir: &Path, tx: Sender<MonitorEvent>) -> notify::Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            for id in event.paths.iter().filter_map(|p| Store::id_from_path(p)) {
                // A full channel already has refreshes queued; the tick catches up.
                let _ = tx.try_send(MonitorEvent::StoreChanged(id));
            }
        },
        Config::default(),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

/// Runs refreshes off the input path, at most one full refresh at a time.
pub struct Refresher {
    controller: Arc<Controller>,
    tx: Sender<MonitorEvent>,
    full_in_flight: bool,
}

impl Refresher {
    pub fn new(controller: Arc<Controller>, tx: Sender<MonitorEvent>) -> Self {
        Self {
            controller,
            tx,
            full_in_flight: false,
        }
    }

    pub fn full(&mut self) {
        if self.full_in_flight {
            return;
        }
        self.full_in_flight = true;
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || controller.snapshot())
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            let _ = tx.send(MonitorEvent::Refreshed(result)).await;
        });
    }

    pub fn full_done(&mut self) {
        self.full_in_flight = false;
    }

    pub fn one(&self, id: String) {
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let lookup_id = id.clone();
            let record = match tokio::task::spawn_blocking(move || controller.refresh(&lookup_id))
                .await
            {
                Ok(Ok(record)) => record,
                Ok(Err(e)) => {
                    // Corrupt or mid-write; keep the row and let the next tick settle it.
                    debug!("Refresh of {} failed: {}", id, e);
                    return;
                }
                Err(e) => {
                    debug!("Refresh task for {} failed: {}", id, e);
                    return;
                }
            };
            let _ = tx.send(MonitorEvent::RecordRefreshed { id, record }).await;
        });
    }

    /// Run a blocking controller action and report its message.
    pub fn action<F>(&self, action: F)
    where
        F: FnOnce(&Controller) -> String + Send + 'static,
    {
        let controller = self.controller.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let message = tokio::task::spawn_blocking(move || action(&controller))
                .await
                .unwrap_or_else(|e| format!("action failed: {}", e));
            let _ = tx.send(MonitorEvent::ActionDone(message)).await;
        });
    }
}
