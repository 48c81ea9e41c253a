//! Session management against the server's auth endpoints.
//!
//! Login uses the OAuth2 password flow the server exposes: a form-encoded
//! username/password POST that returns a bearer token. The session is
//! persisted to the platform config dir so subsequent commands can reuse it.

use anyhow::{Context, Result, bail};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// A stored login: which server, and the token to present to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub server: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[allow(dead_code)]
    token_type: String,
}

impl Session {
    fn path() -> Result<PathBuf> {
        let dir = dirs::config_dir().context("no config directory on this platform")?;
        Ok(dir.join("notesync").join("session.json"))
    }

    /// Load the stored session, if the user has logged in.
    pub fn load() -> Result<Self> {
        let path = Self::path()?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("not logged in (run `notesync login`); no session at {}", path.display()))?;
        serde_json::from_str(&raw).context("corrupt session file")
    }

    /// Persist the session for later commands.
    pub fn store(&self) -> Result<()> {
        let path = Self::path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, serde_json::to_string_pretty(self)?)?;
        debug!("session stored at {}", path.display());
        Ok(())
    }

    /// Remove the stored session (logout).
    pub fn clear() -> Result<()> {
        let path = Self::path()?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

/// Create an account on the server.
pub async fn register(server: &str, email: &str, password: &str) -> Result<()> {
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/auth/register", server.trim_end_matches('/')))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await?;
    if !res.status().is_success() {
        bail!("registration failed: status {}", res.status());
    }
    Ok(())
}

/// Exchange credentials for a bearer token and return the session.
pub async fn login(server: &str, email: &str, password: &str) -> Result<Session> {
    let server = server.trim_end_matches('/').to_string();
    let client = reqwest::Client::new();
    let res = client
        .post(format!("{server}/auth/login"))
        .form(&[("username", email), ("password", password)])
        .send()
        .await?;
    if res.status() == StatusCode::UNAUTHORIZED {
        bail!("incorrect email or password");
    }
    if !res.status().is_success() {
        bail!("login failed: status {}", res.status());
    }
    let token: TokenResponse = res.json().await?;
    Ok(Session {
        server,
        access_token: token.access_token,
    })
}
