//! NotesApi trait boundary and error taxonomy.
//!
//! Implementations:
//! - `InMemoryServer` - for testing; enforces the same compare-and-swap rule
//!   as the real server
//! - `HttpApi` (in notesync-cli) - REST client over HTTP

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

use crate::note::{Note, NoteId, WriteSnapshot};

#[derive(Debug, Error)]
pub enum ApiError {
    /// The server's stored version differs from the one the write carried.
    /// Recoverable by the user, never auto-retried.
    #[error("version conflict on note {0}")]
    Conflict(NoteId),

    #[error("note not found: {0}")]
    NotFound(NoteId),

    /// The session is invalid or expired. Surfaced to the session manager;
    /// the sync core only classifies it.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Any other non-success response from the server.
    #[error("server error: status {0}")]
    Server(u16),

    /// Network-level failure (connect, timeout, decode).
    #[error("transport error: {0}")]
    Transport(String),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl ApiError {
    /// Transient failures are naturally retried by the next edit; conflicts
    /// and auth failures are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Server(_) | ApiError::Transport(_))
    }
}

/// Body of a create request. The server assigns id and version (1).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateNote {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Body of an update request: the full title and content plus the version
/// the client last observed as authoritative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNote {
    pub title: Option<String>,
    pub content: Option<String>,
    pub version: u64,
}

/// Transport-independent boundary to the notes server.
#[async_trait]
pub trait NotesApi: Send + Sync {
    /// Create a note. Returns the authoritative copy (version 1).
    async fn create(&self, body: CreateNote) -> Result<Note>;

    /// List all notes visible to the session.
    async fn list(&self) -> Result<Vec<Note>>;

    /// Fetch the authoritative copy of one note.
    async fn get(&self, id: NoteId) -> Result<Note>;

    /// Compare-and-swap write: accepted only if `body.version` matches the
    /// stored version. Returns the post-increment authoritative copy.
    async fn update(&self, id: NoteId, body: UpdateNote) -> Result<Note>;

    /// Delete a note.
    async fn delete(&self, id: NoteId) -> Result<()>;
}

// Allows sharing one server between an engine and a test harness.
#[async_trait]
impl<T: NotesApi + Send + Sync> NotesApi for std::sync::Arc<T> {
    async fn create(&self, body: CreateNote) -> Result<Note> {
        (**self).create(body).await
    }

    async fn list(&self) -> Result<Vec<Note>> {
        (**self).list().await
    }

    async fn get(&self, id: NoteId) -> Result<Note> {
        (**self).get(id).await
    }

    async fn update(&self, id: NoteId, body: UpdateNote) -> Result<Note> {
        (**self).update(id, body).await
    }

    async fn delete(&self, id: NoteId) -> Result<()> {
        (**self).delete(id).await
    }
}

/// In-memory notes server for testing.
///
/// Applies the real server's concurrency rule: an update must carry the
/// stored version and an accepted write increments it by one. Records every
/// dispatched update so tests can assert on coalescing and single-flight
/// behavior, and supports queueing failures for the error paths.
#[derive(Default)]
pub struct InMemoryServer {
    notes: Mutex<HashMap<NoteId, Note>>,
    next_id: AtomicI64,
    /// Errors to return from upcoming `update` calls, in order.
    failures: Mutex<Vec<ApiError>>,
    /// Every update snapshot that reached the server, accepted or not.
    writes: Mutex<Vec<WriteSnapshot>>,
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Queue an error for the next `update` call.
    pub fn fail_next_update(&self, err: ApiError) {
        self.failures.lock().unwrap().push(err);
    }

    /// Snapshots of every update that reached the server, in arrival order.
    pub fn write_log(&self) -> Vec<WriteSnapshot> {
        self.writes.lock().unwrap().clone()
    }

    /// The authoritative copy, if the note exists.
    pub fn stored(&self, id: NoteId) -> Option<Note> {
        self.notes.lock().unwrap().get(&id).cloned()
    }

    /// All stored notes, ordered by id. Synchronous counterpart of `list`
    /// for assertions outside async contexts.
    pub fn stored_notes(&self) -> Vec<Note> {
        let mut notes: Vec<Note> = self.notes.lock().unwrap().values().cloned().collect();
        notes.sort_by_key(|n| n.id);
        notes
    }

    /// Seed a note directly, bypassing `create`. Returns the stored copy.
    pub fn seed(&self, title: Option<&str>, content: Option<&str>) -> Note {
        let note = Note {
            id: NoteId::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
            title: title.map(str::to_string),
            content: content.map(str::to_string),
            version: 1,
        };
        self.notes.lock().unwrap().insert(note.id, note.clone());
        note
    }
}

#[async_trait]
impl NotesApi for InMemoryServer {
    async fn create(&self, body: CreateNote) -> Result<Note> {
        let note = Note {
            id: NoteId::new(self.next_id.fetch_add(1, Ordering::Relaxed)),
            title: body.title,
            content: body.content,
            version: 1,
        };
        self.notes.lock().unwrap().insert(note.id, note.clone());
        Ok(note)
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let mut notes: Vec<Note> = self.notes.lock().unwrap().values().cloned().collect();
        notes.sort_by_key(|n| n.id);
        Ok(notes)
    }

    async fn get(&self, id: NoteId) -> Result<Note> {
        self.notes
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(ApiError::NotFound(id))
    }

    async fn update(&self, id: NoteId, body: UpdateNote) -> Result<Note> {
        self.writes.lock().unwrap().push(WriteSnapshot {
            id,
            title: body.title.clone(),
            content: body.content.clone(),
            version: body.version,
        });

        if let Some(err) = {
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                None
            } else {
                Some(failures.remove(0))
            }
        } {
            return Err(err);
        }

        let mut notes = self.notes.lock().unwrap();
        let note = notes.get_mut(&id).ok_or(ApiError::NotFound(id))?;

        if note.version != body.version {
            return Err(ApiError::Conflict(id));
        }

        // Mirrors the server: a null field in the body leaves the stored
        // field unchanged.
        if body.title.is_some() {
            note.title = body.title;
        }
        if body.content.is_some() {
            note.content = body.content;
        }
        note.version += 1;
        Ok(note.clone())
    }

    async fn delete(&self, id: NoteId) -> Result<()> {
        self.notes
            .lock()
            .unwrap()
            .remove(&id)
            .map(|_| ())
            .ok_or(ApiError::NotFound(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_sequential_ids_at_version_one() {
        let server = InMemoryServer::new();
        let a = server.create(CreateNote::default()).await.unwrap();
        let b = server.create(CreateNote::default()).await.unwrap();
        assert_eq!(a.id.as_i64(), 1);
        assert_eq!(b.id.as_i64(), 2);
        assert_eq!(a.version, 1);
    }

    #[tokio::test]
    async fn test_update_applies_compare_and_swap() {
        let server = InMemoryServer::new();
        let note = server.seed(Some("Untitled"), Some(""));
        let updated = server
            .update(
                note.id,
                UpdateNote {
                    title: Some("A".into()),
                    content: Some("body".into()),
                    version: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.title.as_deref(), Some("A"));

        // Stale version is rejected without mutating the stored copy.
        let err = server
            .update(
                note.id,
                UpdateNote {
                    title: Some("B".into()),
                    content: None,
                    version: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(id) if id == note.id));
        assert_eq!(server.stored(note.id).unwrap().title.as_deref(), Some("A"));
        assert_eq!(server.stored(note.id).unwrap().version, 2);
    }

    #[tokio::test]
    async fn test_update_null_field_leaves_stored_value() {
        let server = InMemoryServer::new();
        let note = server.seed(Some("title"), Some("content"));
        let updated = server
            .update(
                note.id,
                UpdateNote {
                    title: None,
                    content: Some("new".into()),
                    version: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title.as_deref(), Some("title"));
        assert_eq!(updated.content.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_injected_failure_consumed_in_order() {
        let server = InMemoryServer::new();
        let note = server.seed(None, None);
        server.fail_next_update(ApiError::Transport("connection reset".into()));

        let err = server
            .update(
                note.id,
                UpdateNote {
                    title: None,
                    content: None,
                    version: 1,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));

        // The failure is consumed; the next write goes through.
        server
            .update(
                note.id,
                UpdateNote {
                    title: None,
                    content: None,
                    version: 1,
                },
            )
            .await
            .unwrap();
        assert_eq!(server.write_log().len(), 2);
    }

    #[tokio::test]
    async fn test_get_and_delete() {
        let server = InMemoryServer::new();
        let note = server.seed(Some("keep"), None);
        assert_eq!(server.get(note.id).await.unwrap().title.as_deref(), Some("keep"));

        server.delete(note.id).await.unwrap();
        assert!(matches!(
            server.get(note.id).await.unwrap_err(),
            ApiError::NotFound(_)
        ));
    }
}
