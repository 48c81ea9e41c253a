//! End-to-end autosave tests: a real file watcher feeding the sync engine
//! against an in-memory server.
//!
//! These run on the real clock with a short debounce window; assertions
//! poll with deadlines instead of assuming exact timings.

use std::sync::Arc;
use std::time::Duration;

use notesync::SyncStatus;
use notesync::api::{InMemoryServer, NotesApi, UpdateNote};
use notesync_cli::{AutosaveSession, FileWatcher};
use tempfile::TempDir;
use tokio::time::timeout;

const DEBOUNCE: Duration = Duration::from_millis(100);
const DEADLINE: Duration = Duration::from_secs(10);

struct Harness {
    server: Arc<InMemoryServer>,
    session: AutosaveSession<Arc<InMemoryServer>>,
    watcher: FileWatcher,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = TempDir::new().expect("tempdir");
        let server = Arc::new(InMemoryServer::new());
        let session = AutosaveSession::start(
            Arc::clone(&server),
            dir.path().to_path_buf(),
            DEBOUNCE,
        )
        .await
        .expect("session start");
        let watcher = FileWatcher::new(dir.path().to_path_buf()).expect("watcher");
        Self {
            server,
            session,
            watcher,
            dir,
        }
    }

    fn write_file(&self, name: &str, content: &str) {
        std::fs::write(self.dir.path().join(name), content).expect("write file");
    }

    /// Pump watcher events into the session until the condition holds.
    /// Panics if the deadline passes first.
    async fn pump_until(&mut self, what: &str, cond: impl Fn(&Harness) -> bool) {
        let deadline = tokio::time::Instant::now() + DEADLINE;
        while !cond(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for: {what}"
            );
            match timeout(Duration::from_millis(50), self.watcher.event_rx().recv()).await {
                Ok(Some(event)) => {
                    self.session.on_file_event(event).await.expect("file event");
                }
                // No event right now; engine timers make progress on their
                // own, keep polling the condition.
                Ok(None) | Err(_) => {}
            }
        }
    }
}

#[tokio::test]
async fn test_new_file_becomes_a_note() {
    let mut h = Harness::new().await;

    h.write_file("todo.md", "buy milk\n");
    h.pump_until("note created", |h| !h.server.stored_notes().is_empty())
        .await;

    let notes = h.server.stored_notes();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].title.as_deref(), Some("todo"));
    assert_eq!(notes[0].content.as_deref(), Some("buy milk\n"));
    assert_eq!(notes[0].version, 1);
    assert_eq!(h.session.manifest().id_for("todo.md"), Some(notes[0].id));
}

#[tokio::test]
async fn test_edits_autosave_with_version_bump() {
    let mut h = Harness::new().await;

    h.write_file("todo.md", "v1 content");
    h.pump_until("note created", |h| !h.server.stored_notes().is_empty())
        .await;
    let id = h.server.stored_notes()[0].id;

    h.write_file("todo.md", "v2 content");
    h.pump_until("edit saved", |h| {
        h.server
            .stored(id)
            .is_some_and(|n| n.version == 2 && n.content.as_deref() == Some("v2 content"))
    })
    .await;

    assert_eq!(h.session.engine().status(id), Some(SyncStatus::Saved));
    assert_eq!(h.session.engine().note(id).unwrap().version, 2);
}

#[tokio::test]
async fn test_concurrent_writer_surfaces_conflict() {
    let mut h = Harness::new().await;

    h.write_file("shared.md", "base");
    h.pump_until("note created", |h| !h.server.stored_notes().is_empty())
        .await;
    let id = h.server.stored_notes()[0].id;

    // Another client bumps the server to version 2 behind our back.
    h.server
        .update(
            id,
            UpdateNote {
                title: Some("shared".into()),
                content: Some("theirs".into()),
                version: 1,
            },
        )
        .await
        .expect("concurrent update");

    h.write_file("shared.md", "mine");
    h.pump_until("conflict surfaced", |h| {
        h.session.engine().status(id) == Some(SyncStatus::Conflict)
    })
    .await;

    // The user's edit is preserved locally; the server copy is untouched.
    assert_eq!(
        h.session.engine().note(id).unwrap().content.as_deref(),
        Some("mine")
    );
    assert_eq!(h.server.stored(id).unwrap().content.as_deref(), Some("theirs"));
    assert_eq!(h.server.stored(id).unwrap().version, 2);
}

#[tokio::test]
async fn test_removed_file_closes_without_deleting_server_copy() {
    let mut h = Harness::new().await;

    h.write_file("gone.md", "content");
    h.pump_until("note created", |h| !h.server.stored_notes().is_empty())
        .await;
    let id = h.server.stored_notes()[0].id;

    std::fs::remove_file(h.dir.path().join("gone.md")).expect("remove");
    h.pump_until("note closed", |h| {
        h.session.manifest().id_for("gone.md").is_none()
    })
    .await;

    assert!(h.session.engine().note(id).is_none());
    assert!(h.server.stored(id).is_some());
}
