// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File system watcher for the source directory

use notify::event::CreateKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use tracing::info;

use crate::Result;

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A new file was created
    FileCreated(PathBuf),
    /// A new directory was created
    DirectoryCreated(PathBuf),
    /// Watcher error
    Error(String),
    /// The notification thread is gone
    Disconnected,
}

/// Non-recursive watcher on a single directory
pub struct FileWatcher {
    // Dropping the watcher stops the notification thread
    _watcher: RecommendedWatcher,
    watched: PathBuf,
    event_rx: Receiver<notify::Result<Event>>,
}

impl FileWatcher {
    /// Start watching `path` for creation events
    pub fn new(path: &Path) -> Result<Self> {
        let (tx, rx) = channel();

        let config = Config::default()
            .with_poll_interval(Duration::from_secs(2));

        let mut watcher = RecommendedWatcher::new(tx, config)?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;
        info!("Watching: {:?}", path);

        Ok(Self {
            _watcher: watcher,
            watched: path.to_path_buf(),
            event_rx: rx,
        })
    }

    /// Get the next event (blocking with timeout)
    pub fn next_event(&self, timeout: Duration) -> Option<WatchEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(Ok(event)) => convert_event(event),
            Ok(Err(e)) => Some(WatchEvent::Error(e.to_string())),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(WatchEvent::Disconnected),
        }
    }

    pub fn watched_path(&self) -> &Path {
        &self.watched
    }
}

/// Convert a notify event, keeping only creations
pub fn convert_event(event: Event) -> Option<WatchEvent> {
    let path = event.paths.first()?.clone();
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Some(WatchEvent::DirectoryCreated(path)),
        // Some backends only report CreateKind::Any
        EventKind::Create(_) if path.is_dir() => Some(WatchEvent::DirectoryCreated(path)),
        EventKind::Create(_) => Some(WatchEvent::FileCreated(path)),
        _ => None,
    }
}

/// Drops events that arrive too soon after the last accepted one
#[derive(Debug, Clone)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self { window, last_accepted: None }
    }

    /// Accept or ignore an event observed at `now`
    pub fn accept(&mut self, now: Instant) -> bool {
        let accepted = match self.last_accepted {
            Some(last) => now.saturating_duration_since(last) >= self.window,
            None => true,
        };
        if accepted {
            self.last_accepted = Some(now);
        }
        accepted
    }
}
