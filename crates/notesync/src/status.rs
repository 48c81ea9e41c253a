//! Per-note synchronization status.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};

/// User-visible synchronization state of a note.
///
/// Transitions are driven by three kinds of events: edits, debounce timer
/// fires, and write resolutions. `Conflict` is sticky (only an explicit
/// resolution clears it); `Error` is not (the next edit schedules normally).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// In sync with the server, nothing pending.
    Idle,
    /// An edit is buffered and a debounce timer is running.
    Scheduled,
    /// A write is in flight.
    Saving,
    /// The last write was accepted.
    Saved,
    /// The last write was rejected because the server holds a newer
    /// version. Writes are suppressed until resolved.
    Conflict,
    /// The last write failed for a transient reason.
    Error,
}

impl SyncStatus {
    /// Whether an edit in this state may (re)start the debounce timer.
    ///
    /// `Saving` defers to the dirty-while-saving flag instead; `Conflict`
    /// suppresses scheduling entirely so the conflict is never masked by a
    /// follow-up write.
    pub fn allows_scheduling(&self) -> bool {
        matches!(
            self,
            SyncStatus::Idle | SyncStatus::Scheduled | SyncStatus::Saved | SyncStatus::Error
        )
    }

    /// Whether a write is currently in flight.
    pub fn in_flight(&self) -> bool {
        matches!(self, SyncStatus::Saving)
    }
}

impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Scheduled => "scheduled",
            SyncStatus::Saving => "saving",
            SyncStatus::Saved => "saved",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_predicate() {
        assert!(SyncStatus::Idle.allows_scheduling());
        assert!(SyncStatus::Scheduled.allows_scheduling());
        assert!(SyncStatus::Saved.allows_scheduling());
        assert!(SyncStatus::Error.allows_scheduling());
        assert!(!SyncStatus::Saving.allows_scheduling());
        assert!(!SyncStatus::Conflict.allows_scheduling());
    }

    #[test]
    fn test_display() {
        assert_eq!(SyncStatus::Conflict.to_string(), "conflict");
        assert_eq!(SyncStatus::Saving.to_string(), "saving");
    }
}
