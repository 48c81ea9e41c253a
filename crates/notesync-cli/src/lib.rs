//! notesync-cli library: exposes client components for integration tests.
//!
//! This is a thin library layer over the CLI components, allowing
//! integration tests to drive the watcher and autosave loop directly.

pub mod auth;
pub mod autosave;
pub mod http;
pub mod manifest;
pub mod watcher;

pub use autosave::AutosaveSession;
pub use http::HttpApi;
pub use manifest::Manifest;
pub use watcher::{FileEvent, FileEventKind, FileWatcher};
