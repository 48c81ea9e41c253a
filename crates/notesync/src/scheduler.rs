//! Debounced write scheduling.
//!
//! One cancellable timer per note: every edit restarts that note's timer, so
//! a burst of keystrokes produces a single flush once the user pauses for
//! the quiescence window. Only the most recent edit within the window is
//! ever sent; intermediate states coalesce.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

use crate::note::NoteId;

/// Quiescence window before a buffered edit is flushed to the server.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(800);

/// Explicit map of note id -> pending flush timer.
///
/// Timers are independent per note. Restarting a note's timer aborts the
/// previous one; cancellation on teardown is explicit rather than left to
/// runtime garbage collection.
pub struct DebounceTimers {
    window: Duration,
    pending: Mutex<HashMap<NoteId, JoinHandle<()>>>,
}

impl DebounceTimers {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// (Re)start the timer for a note. Any previous timer is cancelled;
    /// `fire` runs once the full window has elapsed undisturbed.
    ///
    /// Cancellation can only land during the sleep. Once the window
    /// elapses, `fire` runs on a detached task to completion, so a flush
    /// that has started dispatching can no longer be torn down halfway.
    pub fn restart<F>(&self, id: NoteId, fire: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let window = self.window;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            tokio::spawn(fire);
        });

        let mut pending = self.pending.lock().unwrap();
        if let Some(previous) = pending.insert(id, handle) {
            trace!("superseding pending timer for note {id}");
            previous.abort();
        }
    }

    /// Cancel the pending timer for a note. Returns whether one existed.
    pub fn cancel(&self, id: NoteId) -> bool {
        match self.pending.lock().unwrap().remove(&id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Drop a note's timer entry without aborting, once it has fired.
    pub fn clear(&self, id: NoteId) {
        self.pending.lock().unwrap().remove(&id);
    }

    /// Cancel every pending timer (engine shutdown).
    pub fn cancel_all(&self) {
        let mut pending = self.pending.lock().unwrap();
        for (_, handle) in pending.drain() {
            handle.abort();
        }
    }

    /// Whether a timer entry exists for the note.
    pub fn is_pending(&self, id: NoteId) -> bool {
        self.pending.lock().unwrap().contains_key(&id)
    }
}
