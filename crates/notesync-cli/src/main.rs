//! notesync: autosaving CLI client for a versioned notes server.
//!
//! Edits to watched markdown files are debounced and written to the server
//! as optimistic, versioned updates; conflicting writes are surfaced, never
//! silently resolved.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use notesync::api::{CreateNote, NotesApi};
use notesync::{DEFAULT_DEBOUNCE, NoteId, SyncEvent, SyncStatus};

use notesync_cli::auth::{self, Session};
use notesync_cli::autosave::{self, AutosaveSession};
use notesync_cli::http::HttpApi;
use notesync_cli::watcher::FileWatcher;

#[derive(Parser, Debug)]
#[command(name = "notesync")]
#[command(about = "Autosaving client for a versioned notes server")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging
    #[arg(long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an account on the server
    Register {
        /// Server base URL, e.g. http://localhost:8000
        #[arg(short, long)]
        server: String,
        email: String,
    },
    /// Log in and store the session token
    Login {
        /// Server base URL, e.g. http://localhost:8000
        #[arg(short, long)]
        server: String,
        email: String,
    },
    /// Remove the stored session
    Logout,
    /// List notes
    List,
    /// Create an empty note
    Create { title: String },
    /// Delete a note on the server
    Delete { id: NoteId },
    /// Download all notes into a directory
    Pull {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
    /// Watch a directory and autosave edits to the server
    Watch {
        #[arg(short, long, default_value = ".")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respects RUST_LOG, defaults to info (or debug with --verbose).
    let default_filter = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Command::Register { server, email } => {
            let password = prompt_password()?;
            auth::register(&server, &email, &password).await?;
            println!("registered {email}; log in with `notesync login`");
        }
        Command::Login { server, email } => {
            let password = prompt_password()?;
            let session = auth::login(&server, &email, &password).await?;
            session.store()?;
            println!("logged in to {}", session.server);
        }
        Command::Logout => {
            Session::clear()?;
            println!("logged out");
        }
        Command::List => {
            let api = api_from_session()?;
            for note in api.list().await? {
                println!(
                    "{:>6}  v{:<4} {}",
                    note.id,
                    note.version,
                    note.title.as_deref().unwrap_or("Untitled")
                );
            }
        }
        Command::Create { title } => {
            let api = api_from_session()?;
            let note = api
                .create(CreateNote {
                    title: Some(title),
                    content: Some(String::new()),
                })
                .await?;
            println!("created note {} at version {}", note.id, note.version);
        }
        Command::Delete { id } => {
            let api = api_from_session()?;
            api.delete(id).await?;
            println!("deleted note {id}");
        }
        Command::Pull { dir } => {
            let api = api_from_session()?;
            let count = autosave::pull(&api, &dir).await?;
            println!("pulled {count} note(s) into {}", dir.display());
        }
        Command::Watch { dir } => watch(dir).await?,
    }
    Ok(())
}

/// Run the autosave loop until interrupted.
async fn watch(dir: PathBuf) -> Result<()> {
    let api = api_from_session()?;
    let mut session = AutosaveSession::start(api, dir.clone(), DEFAULT_DEBOUNCE).await?;
    let mut watcher = FileWatcher::new(dir)?;

    // Status line, mirroring what an editor UI would show.
    let _sub = session.engine().subscribe(|event| match event {
        SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Saving,
        } => info!("note {id}: saving..."),
        SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Saved,
        } => info!("note {id}: saved"),
        SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Conflict,
        } => warn!("note {id}: conflict detected; the server has a newer version"),
        SyncEvent::StatusChanged {
            id,
            status: SyncStatus::Error,
        } => warn!("note {id}: error saving note; will retry on the next edit"),
        SyncEvent::SessionExpired { .. } => {
            warn!("session expired; log in again with `notesync login`")
        }
        _ => {}
    });

    info!("watching {} (Ctrl+C to stop)", watcher.dir().display());

    loop {
        tokio::select! {
            Some(event) = watcher.event_rx().recv() => {
                if let Err(err) = session.on_file_event(event).await {
                    warn!("failed to process file event: {err:#}");
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }
    Ok(())
}

fn api_from_session() -> Result<HttpApi> {
    let session = Session::load()?;
    Ok(HttpApi::new(session.server, session.access_token))
}

fn prompt_password() -> Result<String> {
    eprint!("password: ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
