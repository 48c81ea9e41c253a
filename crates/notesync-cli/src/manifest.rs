//! Mapping between local markdown files and server note ids.
//!
//! Stored as `.notesync.json` at the root of the watched directory, so a
//! pulled directory keeps its server identities across runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use notesync::note::{Note, NoteId};

pub const MANIFEST_FILE: &str = ".notesync.json";

/// Relative file path -> note id, persisted as JSON.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Manifest {
    pub notes: BTreeMap<String, NoteId>,
}

impl Manifest {
    /// Load the manifest from a directory; a missing file is an empty
    /// manifest, not an error.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn store(&self, dir: &Path) -> Result<()> {
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    pub fn id_for(&self, path: &str) -> Option<NoteId> {
        self.notes.get(path).copied()
    }

    pub fn path_for(&self, id: NoteId) -> Option<&str> {
        self.notes
            .iter()
            .find(|(_, mapped)| **mapped == id)
            .map(|(path, _)| path.as_str())
    }

    pub fn insert(&mut self, path: impl Into<String>, id: NoteId) {
        self.notes.insert(path.into(), id);
    }

    pub fn remove(&mut self, path: &str) -> Option<NoteId> {
        self.notes.remove(path)
    }

    /// Pick a file name for a pulled note: a slug of its title, suffixed
    /// with the id when the slug is empty or already taken.
    pub fn file_name_for(&self, note: &Note) -> String {
        let slug = slugify(note.title.as_deref().unwrap_or(""));
        let candidate = if slug.is_empty() {
            format!("untitled-{}.md", note.id)
        } else {
            format!("{slug}.md")
        };
        if self.notes.contains_key(&candidate) {
            format!("{}-{}.md", candidate.trim_end_matches(".md"), note.id)
        } else {
            candidate
        }
    }
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}
