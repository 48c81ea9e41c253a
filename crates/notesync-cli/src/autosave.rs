//! Autosave loop state: wires file events into the sync engine.
//!
//! Each watched markdown file maps (via the manifest) to a server note. A
//! modified file becomes an edit to that note's working copy; the engine
//! debounces and writes it. Files without a mapping become new notes.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use notesync::api::{CreateNote, NotesApi};
use notesync::engine::{EngineError, SyncEngine};
use notesync::note::NoteDraft;

use crate::manifest::Manifest;
use crate::watcher::{FileEvent, FileEventKind};

/// State for one watched directory.
pub struct AutosaveSession<A: NotesApi + 'static> {
    engine: Arc<SyncEngine<A>>,
    manifest: Manifest,
    dir: PathBuf,
}

impl<A: NotesApi + 'static> AutosaveSession<A> {
    /// Load the directory's manifest and open every server note in the
    /// engine, ready to receive file events.
    pub async fn start(api: A, dir: PathBuf, window: Duration) -> Result<Self> {
        let manifest = Manifest::load(&dir)?;
        let engine = SyncEngine::with_debounce(api, window);
        let notes = engine.load_notes().await?;
        debug!("opened {} notes from server", notes.len());
        Ok(Self {
            engine,
            manifest,
            dir,
        })
    }

    pub fn engine(&self) -> &Arc<SyncEngine<A>> {
        &self.engine
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Handle a file event from the watcher.
    pub async fn on_file_event(&mut self, event: FileEvent) -> Result<()> {
        match event.kind {
            FileEventKind::Modified => self.on_file_modified(&event.path).await,
            FileEventKind::Removed => self.on_file_removed(&event.path),
        }
    }

    /// A file was created or saved: feed the new content to the engine,
    /// creating the server note first if this file is new.
    async fn on_file_modified(&mut self, path: &str) -> Result<()> {
        let full = self.dir.join(path);
        let content = match tokio::fs::read_to_string(&full).await {
            Ok(content) => content,
            Err(err) => {
                // The file may already be gone again; the removal event
                // will follow.
                warn!("failed to read {}: {}", full.display(), err);
                return Ok(());
            }
        };

        match self.manifest.id_for(path) {
            Some(id) => {
                // The title is not derivable from the file; keep whatever
                // the working copy has.
                let title = self.engine.note(id).and_then(|note| note.title);
                match self.engine.on_edit(id, NoteDraft::new(title, Some(content))) {
                    Ok(()) => {}
                    Err(EngineError::UnknownNote(_)) => {
                        warn!("note {id} for {path} is not on the server; skipping edit");
                    }
                    Err(err) => return Err(err.into()),
                }
            }
            None => {
                let title = Path::new(path)
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string);
                let note = self
                    .engine
                    .create(CreateNote {
                        title,
                        content: Some(content),
                    })
                    .await?;
                info!("created note {} for {}", note.id, path);
                self.manifest.insert(path, note.id);
                self.manifest.store(&self.dir)?;
            }
        }
        Ok(())
    }

    /// A file disappeared: tear down the client state but keep the server
    /// copy. Deleting remotely is an explicit command, never a side effect
    /// of a local file operation.
    fn on_file_removed(&mut self, path: &str) -> Result<()> {
        if let Some(id) = self.manifest.remove(path) {
            self.engine.close(id);
            self.manifest.store(&self.dir)?;
            info!("closed note {id} ({path} removed); server copy kept");
        }
        Ok(())
    }
}

/// Download every note into `dir`, recording ids in the manifest. Returns
/// the number of files written.
pub async fn pull<A: NotesApi>(api: &A, dir: &Path) -> Result<usize> {
    let notes = api.list().await?;
    let mut manifest = Manifest::load(dir)?;
    let mut written = 0;
    for note in &notes {
        let path = match manifest.path_for(note.id) {
            Some(existing) => existing.to_string(),
            None => {
                let name = manifest.file_name_for(note);
                manifest.insert(name.clone(), note.id);
                name
            }
        };
        tokio::fs::write(dir.join(&path), note.content.as_deref().unwrap_or("")).await?;
        written += 1;
    }
    manifest.store(dir)?;
    Ok(written)
}
