//! Optimistic write coordination.
//!
//! The engine owns a working copy per open note and serializes writes
//! against the server's compare-and-swap protocol:
//!
//! 1. An edit updates the working copy and restarts the note's debounce
//!    timer (or, while a write is in flight, marks the note dirty).
//! 2. The timer fires, the current working copy is snapshotted into the
//!    note's single in-flight slot, and the write is dispatched.
//! 3. The response resolves into exactly one outcome - saved, conflict or
//!    error - folded back into the note's `SyncStatus`. A dirty note
//!    re-enters the scheduled state after resolution.
//!
//! Writes for distinct notes are independent and may be in flight
//! simultaneously; writes for one note are strictly serialized by the
//! in-flight slot. State is guarded by a lock that is never held across an
//! await.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::api::{ApiError, CreateNote, NotesApi, UpdateNote};
use crate::events::{EventBus, Subscription, SyncEvent};
use crate::note::{Note, NoteDraft, NoteId, WriteSnapshot};
use crate::scheduler::{DEFAULT_DEBOUNCE, DebounceTimers};
use crate::status::SyncStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown note: {0}")]
    UnknownNote(NoteId),

    /// Two writes for one note would have been outstanding at once, or a
    /// resolution arrived for a note with nothing in flight. A coordinator
    /// defect: it fails loudly instead of being swallowed.
    #[error("single-flight violation for note {0}")]
    SingleFlightViolation(NoteId),

    /// The note has an unresolved conflict; writes stay suppressed until
    /// it is explicitly resolved.
    #[error("note {0} has an unresolved conflict")]
    Unresolved(NoteId),

    #[error("note {0} is not in conflict")]
    NotInConflict(NoteId),

    #[error(transparent)]
    Api(#[from] ApiError),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Per-note coordinator state.
struct DocState {
    /// The working copy, including the last version observed as
    /// authoritative (or a stale one while in conflict).
    note: Note,
    status: SyncStatus,
    /// The snapshot currently on the wire. `Some` exactly while status is
    /// `Saving`; this slot is what makes single-flight checkable.
    in_flight: Option<WriteSnapshot>,
    /// Set when an edit arrives while a write is in flight; consumed on
    /// resolution to re-enter the scheduled state.
    dirty_while_saving: bool,
}

impl DocState {
    fn new(note: Note) -> Self {
        Self {
            note,
            status: SyncStatus::Idle,
            in_flight: None,
            dirty_while_saving: false,
        }
    }
}

/// Client-side synchronization engine for a set of notes.
///
/// Construct with [`SyncEngine::new`], which returns an `Arc`; the engine
/// hands weak references to its own timer tasks.
pub struct SyncEngine<A> {
    api: A,
    docs: Mutex<HashMap<NoteId, DocState>>,
    timers: DebounceTimers,
    events: Arc<EventBus>,
}

impl<A: NotesApi + 'static> SyncEngine<A> {
    /// Engine with the default quiescence window.
    pub fn new(api: A) -> Arc<Self> {
        Self::with_debounce(api, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(api: A, window: Duration) -> Arc<Self> {
        Arc::new(Self {
            api,
            docs: Mutex::new(HashMap::new()),
            timers: DebounceTimers::new(window),
            events: Arc::new(EventBus::new()),
        })
    }

    /// Subscribe to engine events. Drop the subscription to unsubscribe.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SyncEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.events.subscribe(callback)
    }

    /// Register a note loaded from the server. A note that is already open
    /// keeps its working copy; local edits are never clobbered by a reload.
    pub fn open(&self, note: Note) {
        let mut docs = self.docs.lock().unwrap();
        docs.entry(note.id).or_insert_with(|| DocState::new(note));
    }

    /// Fetch the listing from the server and open every note in it.
    pub async fn load_notes(&self) -> Result<Vec<Note>> {
        let notes = self.api.list().await?;
        for note in &notes {
            self.open(note.clone());
        }
        Ok(notes)
    }

    /// Create a note on the server and open its working copy.
    pub async fn create(&self, body: CreateNote) -> Result<Note> {
        let note = self.api.create(body).await?;
        debug!("created note {} at version {}", note.id, note.version);
        self.open(note.clone());
        Ok(note)
    }

    /// The working copy of a note, if open.
    pub fn note(&self, id: NoteId) -> Option<Note> {
        self.docs.lock().unwrap().get(&id).map(|doc| doc.note.clone())
    }

    /// The sync status of a note, if open.
    pub fn status(&self, id: NoteId) -> Option<SyncStatus> {
        self.docs.lock().unwrap().get(&id).map(|doc| doc.status)
    }

    /// All open working copies, ordered by id. Entries are patched in place
    /// by id as writes resolve.
    pub fn notes(&self) -> Vec<Note> {
        let docs = self.docs.lock().unwrap();
        let mut notes: Vec<Note> = docs.values().map(|doc| doc.note.clone()).collect();
        notes.sort_by_key(|n| n.id);
        notes
    }

    /// Record an edit to a note's working copy.
    ///
    /// Restarts the note's debounce timer unless a write is in flight (the
    /// edit is flushed after the write resolves) or the note is in conflict
    /// (edits only update the working copy until the conflict is resolved).
    pub fn on_edit(self: &Arc<Self>, id: NoteId, draft: NoteDraft) -> Result<()> {
        let scheduled = {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(&id).ok_or(EngineError::UnknownNote(id))?;
            doc.note.apply(&draft);
            match doc.status {
                SyncStatus::Saving => {
                    debug!("note {id} edited while saving; flush deferred");
                    doc.dirty_while_saving = true;
                    None
                }
                SyncStatus::Conflict => None,
                status => {
                    doc.status = SyncStatus::Scheduled;
                    Some(status != SyncStatus::Scheduled)
                }
            }
        };

        if let Some(newly) = scheduled {
            self.start_timer(id);
            if newly {
                self.events.emit(SyncEvent::StatusChanged {
                    id,
                    status: SyncStatus::Scheduled,
                });
            }
        }
        Ok(())
    }

    /// Flush a buffered edit immediately, or retry after a transient error,
    /// without waiting out the rest of the debounce window.
    ///
    /// While a write is in flight this only marks the note dirty (the flush
    /// happens after resolution); a conflicted note is refused.
    pub async fn save_now(self: &Arc<Self>, id: NoteId) -> Result<()> {
        self.timers.cancel(id);
        self.dispatch(id, true).await
    }

    /// Resolve a conflict by adopting the server's authoritative copy,
    /// discarding the local draft.
    pub async fn resolve_with_server(&self, id: NoteId) -> Result<Note> {
        self.ensure_conflicted(id)?;
        let server = self.api.get(id).await?;
        {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(&id).ok_or(EngineError::UnknownNote(id))?;
            doc.note = server.clone();
            doc.status = SyncStatus::Idle;
            doc.dirty_while_saving = false;
        }
        self.events.emit(SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Idle,
        });
        Ok(server)
    }

    /// Resolve a conflict by keeping the local draft: refresh the version
    /// from the server and schedule a write of the local content against it.
    pub async fn resolve_with_local(self: &Arc<Self>, id: NoteId) -> Result<()> {
        self.ensure_conflicted(id)?;
        let server = self.api.get(id).await?;
        {
            let mut docs = self.docs.lock().unwrap();
            let doc = docs.get_mut(&id).ok_or(EngineError::UnknownNote(id))?;
            doc.note.version = server.version;
            doc.status = SyncStatus::Scheduled;
        }
        self.start_timer(id);
        self.events.emit(SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Scheduled,
        });
        Ok(())
    }

    /// Delete the note on the server and tear down its client state.
    pub async fn delete(&self, id: NoteId) -> Result<()> {
        self.api.delete(id).await?;
        self.close(id);
        Ok(())
    }

    /// Tear down a note's client state, cancelling any pending timer so no
    /// write is issued. A write already in flight cannot be cancelled; it
    /// resolves against nothing and its outcome is dropped with a warning.
    pub fn close(&self, id: NoteId) -> Option<Note> {
        self.timers.cancel(id);
        self.docs.lock().unwrap().remove(&id).map(|doc| doc.note)
    }

    fn ensure_conflicted(&self, id: NoteId) -> Result<()> {
        let docs = self.docs.lock().unwrap();
        let doc = docs.get(&id).ok_or(EngineError::UnknownNote(id))?;
        if doc.status != SyncStatus::Conflict {
            return Err(EngineError::NotInConflict(id));
        }
        Ok(())
    }

    fn start_timer(self: &Arc<Self>, id: NoteId) {
        let weak = Arc::downgrade(self);
        self.timers.restart(id, async move {
            let Some(engine) = Weak::upgrade(&weak) else {
                return;
            };
            if let Err(err) = engine.dispatch(id, false).await {
                warn!("debounced flush for note {id} failed: {err}");
            }
        });
    }

    /// Claim the in-flight slot, dispatch the snapshot, and apply exactly
    /// one outcome. `explicit` marks a user-initiated flush (as opposed to
    /// a timer fire), which is allowed to start from the `Error` state and
    /// reports refusals instead of silently skipping.
    async fn dispatch(self: &Arc<Self>, id: NoteId, explicit: bool) -> Result<()> {
        let snapshot = {
            let mut docs = self.docs.lock().unwrap();
            let Some(doc) = docs.get_mut(&id) else {
                if explicit {
                    return Err(EngineError::UnknownNote(id));
                }
                debug!("timer fired for closed note {id}; nothing to send");
                return Ok(());
            };
            match doc.status {
                SyncStatus::Saving => {
                    // A concurrent flush won the slot. Mark intent if the
                    // working copy has moved past the in-flight snapshot.
                    if explicit
                        && doc
                            .in_flight
                            .as_ref()
                            .is_some_and(|snap| !doc.note.matches(snap))
                    {
                        doc.dirty_while_saving = true;
                    }
                    return Ok(());
                }
                SyncStatus::Conflict => {
                    if explicit {
                        return Err(EngineError::Unresolved(id));
                    }
                    return Ok(());
                }
                SyncStatus::Idle | SyncStatus::Saved => {
                    // Nothing unsaved.
                    return Ok(());
                }
                SyncStatus::Scheduled | SyncStatus::Error => {
                    let snapshot = doc.note.snapshot();
                    doc.status = SyncStatus::Saving;
                    doc.in_flight = Some(snapshot.clone());
                    snapshot
                }
            }
        };
        self.timers.clear(id);

        debug!("dispatching write for note {id} at version {}", snapshot.version);
        self.events.emit(SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Saving,
        });
        self.events.emit(SyncEvent::WriteDispatched {
            id,
            version: snapshot.version,
        });

        let outcome = self
            .api
            .update(
                id,
                UpdateNote {
                    title: snapshot.title.clone(),
                    content: snapshot.content.clone(),
                    version: snapshot.version,
                },
            )
            .await;

        self.apply_outcome(id, &snapshot, outcome)
    }

    /// Fold a write outcome into the note's state. Runs exactly once per
    /// dispatched write; a note is never left in `Saving`.
    fn apply_outcome(
        self: &Arc<Self>,
        id: NoteId,
        snapshot: &WriteSnapshot,
        outcome: crate::api::Result<Note>,
    ) -> Result<()> {
        let mut session_expired = false;
        let (resolved, version, reschedule) = {
            let mut docs = self.docs.lock().unwrap();
            let Some(doc) = docs.get_mut(&id) else {
                warn!("write for note {id} resolved after teardown; outcome dropped");
                return Ok(());
            };
            if doc.in_flight.take().is_none() || doc.status != SyncStatus::Saving {
                debug_assert!(false, "write resolved for note {id} with none in flight");
                return Err(EngineError::SingleFlightViolation(id));
            }

            let resolved = match outcome {
                Ok(server) => {
                    doc.note.version = server.version;
                    if doc.note.matches(snapshot) {
                        // No local edits since the snapshot was taken: the
                        // server echo is authoritative, adopt it verbatim.
                        doc.note.title = server.title;
                        doc.note.content = server.content;
                    }
                    SyncStatus::Saved
                }
                Err(ApiError::Conflict(_)) => {
                    // Keep the user's unsaved edits and the stale version
                    // for inspection; resolution is explicit.
                    SyncStatus::Conflict
                }
                Err(err) => {
                    if matches!(err, ApiError::Unauthenticated) {
                        session_expired = true;
                    }
                    warn!("write for note {id} failed: {err}");
                    SyncStatus::Error
                }
            };
            doc.status = resolved;

            let reschedule = doc.dirty_while_saving && resolved.allows_scheduling();
            doc.dirty_while_saving = false;
            if reschedule {
                doc.status = SyncStatus::Scheduled;
            }
            (resolved, doc.note.version, reschedule)
        };

        self.events.emit(SyncEvent::WriteResolved {
            id,
            status: resolved,
            version,
        });
        if session_expired {
            self.events.emit(SyncEvent::SessionExpired { id });
        }
        if reschedule {
            self.start_timer(id);
            self.events.emit(SyncEvent::StatusChanged {
                id,
                status: SyncStatus::Scheduled,
            });
        } else {
            self.events.emit(SyncEvent::StatusChanged {
                id,
                status: resolved,
            });
        }
        Ok(())
    }
}

impl<A> Drop for SyncEngine<A> {
    fn drop(&mut self) {
        self.timers.cancel_all();
    }
}
