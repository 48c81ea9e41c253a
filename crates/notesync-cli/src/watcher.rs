//! File watcher for the notes directory.
//!
//! Uses notify-debouncer-mini so a single editor save produces one event
//! instead of a burst. The sync engine applies its own, much longer,
//! debounce on top; this layer only keeps the event stream sane.

use anyhow::Result;
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEvent, DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::manifest::MANIFEST_FILE;

/// File event from the watcher.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Path relative to the notes directory
    pub path: String,
    /// Type of event
    pub kind: FileEventKind,
}

/// Type of file event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    /// File was created or modified
    Modified,
    /// File was deleted
    Removed,
}

/// Watches a directory of markdown notes.
pub struct FileWatcher {
    /// Notes directory base path
    dir: PathBuf,
    /// Debouncer handle (must keep alive)
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
    /// Receiver for file events
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
}

impl FileWatcher {
    /// Create a new watcher for the notes directory.
    ///
    /// Uses a 200ms debounce period to avoid rapid-fire events during saves.
    pub fn new(dir: PathBuf) -> Result<Self> {
        // Canonicalize the path to resolve symlinks; event paths come back
        // resolved and must strip cleanly against the base.
        let dir = dir.canonicalize().unwrap_or(dir);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let dir_clone = dir.clone();

        let mut debouncer = new_debouncer(
            Duration::from_millis(200),
            move |result: Result<Vec<DebouncedEvent>, notify::Error>| match result {
                Ok(events) => {
                    for event in events {
                        if let Some(file_event) = Self::process_event(&event, &dir_clone) {
                            if event_tx.send(file_event).is_err() {
                                // Receiver dropped
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("File watcher error: {}", e);
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(&dir, RecursiveMode::Recursive)?;

        Ok(Self {
            dir,
            _debouncer: debouncer,
            event_rx,
        })
    }

    /// Process a single debounced event, returning a FileEvent if relevant.
    fn process_event(event: &DebouncedEvent, dir: &Path) -> Option<FileEvent> {
        let path = &event.path;

        let relative = path.strip_prefix(dir).ok()?;
        let relative_str = relative.to_str()?;

        // Skip the manifest itself
        if relative_str == MANIFEST_FILE {
            return None;
        }

        // Skip hidden files and directories
        if relative_str.starts_with('.') || relative_str.contains("/.") {
            return None;
        }

        // Only process .md files
        if !relative_str.ends_with(".md") {
            return None;
        }

        let kind = match event.kind {
            DebouncedEventKind::Any | DebouncedEventKind::AnyContinuous => {
                if path.exists() {
                    FileEventKind::Modified
                } else {
                    FileEventKind::Removed
                }
            }
            // Handle any future event kinds (non-exhaustive enum)
            _ => {
                if path.exists() {
                    FileEventKind::Modified
                } else {
                    FileEventKind::Removed
                }
            }
        };

        debug!("File event: {:?} - {}", kind, relative_str);

        Some(FileEvent {
            path: relative_str.to_string(),
            kind,
        })
    }

    /// Get the receiver for file events.
    pub fn event_rx(&mut self) -> &mut mpsc::UnboundedReceiver<FileEvent> {
        &mut self.event_rx
    }

    /// Get the watched directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
