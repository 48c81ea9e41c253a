//! Note data model: working copies and write snapshots.
//!
//! The client holds a *working copy* of each open note; the server holds the
//! *authoritative copy*. The working copy's version is either the last
//! version observed as authoritative, or stale awaiting reconciliation after
//! a conflict.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Server-assigned identifier for a note.
///
/// Wraps the server's integer primary key but is otherwise opaque to the
/// client. Stable for the note's lifetime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct NoteId(i64);

impl NoteId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for NoteId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for NoteId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

/// A note as the client sees it: the editable working copy of the server's
/// record.
///
/// Title and content are both nullable on the server, so they are options
/// here rather than empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: Option<String>,
    /// Optimistic concurrency counter. Server-assigned, starts at 1 on
    /// creation and increases by exactly one on every accepted write.
    pub version: u64,
}

impl Note {
    /// Replace the editable fields with the draft's values.
    ///
    /// A draft always carries the full new title and content, never a delta,
    /// so coalescing drafts can never lose data.
    pub fn apply(&mut self, draft: &NoteDraft) {
        self.title = draft.title.clone();
        self.content = draft.content.clone();
    }

    /// Capture the snapshot a write dispatch would carry right now.
    pub fn snapshot(&self) -> WriteSnapshot {
        WriteSnapshot {
            id: self.id,
            title: self.title.clone(),
            content: self.content.clone(),
            version: self.version,
        }
    }

    /// Whether the working copy's editable fields still match a snapshot,
    /// i.e. no further local edits happened since it was taken.
    pub fn matches(&self, snapshot: &WriteSnapshot) -> bool {
        self.title == snapshot.title && self.content == snapshot.content
    }
}

/// An edit to a working copy: the full new title and content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: Option<String>,
    pub content: Option<String>,
}

impl NoteDraft {
    pub fn new(title: Option<String>, content: Option<String>) -> Self {
        Self { title, content }
    }
}

/// Snapshot of a working copy captured at the moment a write is dispatched.
///
/// At most one snapshot may be in flight per note at any time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSnapshot {
    pub id: NoteId,
    pub title: Option<String>,
    pub content: Option<String>,
    /// The version the working copy had when the snapshot was taken.
    pub version: u64,
}
