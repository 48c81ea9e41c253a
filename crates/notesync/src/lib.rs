//! notesync: client-side synchronization core for a versioned notes server.
//!
//! The server of record enforces optimistic concurrency: every note carries a
//! version counter, a write carries the version it was based on, and a
//! mismatch is rejected as a conflict instead of silently overwriting newer
//! state. This crate provides the client half of that protocol:
//! - the per-note working copy and sync status model
//! - a debounced mutation scheduler that coalesces bursts of edits into a
//!   single pending write
//! - an optimistic write coordinator that serializes writes per note,
//!   classifies outcomes, and reconciles local state
//! - the `NotesApi` trait boundary that transports implement

pub mod api;
pub mod engine;
pub mod events;
pub mod note;
pub mod scheduler;
pub mod status;

pub use api::{ApiError, CreateNote, InMemoryServer, NotesApi, UpdateNote};
pub use engine::{EngineError, SyncEngine};
pub use events::{EventBus, Subscription, SyncEvent};
pub use note::{Note, NoteDraft, NoteId, WriteSnapshot};
pub use scheduler::{DEFAULT_DEBOUNCE, DebounceTimers};
pub use status::SyncStatus;
