// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! File watcher for re-exporting on change.
//!
//! Watches the settings file and the generated-pattern file and reports
//! debounced modifications, so a fresh `.mid` can be written every time
//! either one is regenerated.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, warn};

/// Events emitted by the watcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// A watched file was written (after debouncing)
    Changed(PathBuf),
    /// A watched file was removed
    Removed(PathBuf),
    /// The underlying watcher reported an error
    Error(String),
}

/// Debounced watcher over a fixed set of files
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
    event_receiver: Receiver<WatchEvent>,
    watched: Vec<PathBuf>,
}

impl ConfigWatcher {
    /// Watch `files` for modifications.
    ///
    /// The parent directories are watched rather than the files themselves,
    /// so editors that save by replacing the file are still seen.
    ///
    /// # Arguments
    /// * `files` - Existing files to watch
    /// * `debounce_ms` - Debounce duration in milliseconds (default: 300)
    pub fn new<P: AsRef<Path>>(files: &[P], debounce_ms: Option<u64>) -> Result<Self> {
        let debounce_duration = Duration::from_millis(debounce_ms.unwrap_or(300));

        let watched = files
            .iter()
            .map(|file| {
                file.as_ref()
                    .canonicalize()
                    .with_context(|| format!("Failed to resolve watched file {:?}", file.as_ref()))
            })
            .collect::<Result<Vec<_>>>()?;

        let (event_tx, event_rx): (Sender<WatchEvent>, Receiver<WatchEvent>) = mpsc::channel();
        let (notify_tx, notify_rx) = mpsc::channel::<notify::Result<Event>>();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = notify_tx.send(res);
            },
            Config::default(),
        )
        .map_err(|e| anyhow!("Failed to create file watcher: {}", e))?;

        let mut dirs: Vec<PathBuf> = watched
            .iter()
            .filter_map(|file| file.parent().map(Path::to_path_buf))
            .collect();
        dirs.sort();
        dirs.dedup();
        for dir in &dirs {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| anyhow!("Failed to watch path {:?}: {}", dir, e))?;
        }

        let targets = watched.clone();
        std::thread::spawn(move || {
            let mut last_event_time: Option<Instant> = None;
            let mut pending_paths: Vec<PathBuf> = Vec::new();

            loop {
                match notify_rx.recv_timeout(Duration::from_millis(50)) {
                    Ok(Ok(event)) => {
                        let relevant = event.paths.into_iter().filter(|p| targets.contains(p));
                        match event.kind {
                            EventKind::Remove(_) => {
                                for path in relevant {
                                    let _ = event_tx.send(WatchEvent::Removed(path));
                                }
                            }
                            EventKind::Create(_) | EventKind::Modify(_) => {
                                for path in relevant {
                                    if !pending_paths.contains(&path) {
                                        pending_paths.push(path);
                                    }
                                    last_event_time = Some(Instant::now());
                                }
                            }
                            _ => {}
                        }
                    }
                    Ok(Err(e)) => {
                        warn!(error = %e, "file watcher error");
                        let _ = event_tx.send(WatchEvent::Error(e.to_string()));
                    }
                    Err(mpsc::RecvTimeoutError::Timeout) => {
                        if let Some(last_time) = last_event_time {
                            if last_time.elapsed() >= debounce_duration {
                                for path in pending_paths.drain(..) {
                                    debug!(path = %path.display(), "watched file changed");
                                    if event_tx.send(WatchEvent::Changed(path)).is_err() {
                                        return;
                                    }
                                }
                                last_event_time = None;
                            }
                        }
                    }
                    Err(mpsc::RecvTimeoutError::Disconnected) => {
                        // Watcher was dropped, exit thread
                        break;
                    }
                }
            }
        });

        Ok(Self {
            _watcher: watcher,
            event_receiver: event_rx,
            watched,
        })
    }

    /// Try to receive the next event (non-blocking)
    pub fn try_recv(&self) -> Option<WatchEvent> {
        self.event_receiver.try_recv().ok()
    }

    /// Receive all pending events
    pub fn recv_all(&self) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }

    /// Block until the next event is received
    pub fn recv(&self) -> Option<WatchEvent> {
        self.event_receiver.recv().ok()
    }

    /// Canonical paths being watched
    pub fn watched_paths(&self) -> &[PathBuf] {
        &self.watched
    }
}
