//! REST implementation of the `NotesApi` boundary.
//!
//! Talks to the notes server's JSON API with a bearer token. The sync core
//! never sees HTTP: every response folds into the `ApiError` taxonomy here.

use async_trait::async_trait;
use reqwest::StatusCode;

use notesync::api::{ApiError, CreateNote, NotesApi, Result, UpdateNote};
use notesync::note::{Note, NoteId};

/// Classify a non-success HTTP status into the error taxonomy.
///
/// `id` is the note the request addressed; listing and creation have none,
/// so their conflict/not-found statuses fall through to `Server`.
pub fn classify_status(status: StatusCode, id: Option<NoteId>) -> ApiError {
    match (status, id) {
        (StatusCode::CONFLICT, Some(id)) => ApiError::Conflict(id),
        (StatusCode::NOT_FOUND, Some(id)) => ApiError::NotFound(id),
        (StatusCode::UNAUTHORIZED, _) => ApiError::Unauthenticated,
        (status, _) => ApiError::Server(status.as_u16()),
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

/// HTTP client for the notes server.
pub struct HttpApi {
    client: reqwest::Client,
    base: String,
    token: String,
}

impl HttpApi {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        let base = base.into();
        Self {
            client: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn notes_url(&self) -> String {
        format!("{}/notes/", self.base)
    }

    fn note_url(&self, id: NoteId) -> String {
        format!("{}/notes/{}", self.base, id)
    }
}

#[async_trait]
impl NotesApi for HttpApi {
    async fn create(&self, body: CreateNote) -> Result<Note> {
        let res = self
            .client
            .post(self.notes_url())
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(classify_status(res.status(), None));
        }
        res.json::<Note>().await.map_err(transport)
    }

    async fn list(&self) -> Result<Vec<Note>> {
        let res = self
            .client
            .get(self.notes_url())
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(classify_status(res.status(), None));
        }
        res.json::<Vec<Note>>().await.map_err(transport)
    }

    async fn get(&self, id: NoteId) -> Result<Note> {
        let res = self
            .client
            .get(self.note_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(classify_status(res.status(), Some(id)));
        }
        res.json::<Note>().await.map_err(transport)
    }

    async fn update(&self, id: NoteId, body: UpdateNote) -> Result<Note> {
        let res = self
            .client
            .put(self.note_url(id))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(classify_status(res.status(), Some(id)));
        }
        res.json::<Note>().await.map_err(transport)
    }

    async fn delete(&self, id: NoteId) -> Result<()> {
        let res = self
            .client
            .delete(self.note_url(id))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(classify_status(res.status(), Some(id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_conflict_requires_note_context() {
        let id = NoteId::new(5);
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, Some(id)),
            ApiError::Conflict(got) if got == id
        ));
        // A 409 outside a note-addressed request has no conflict meaning.
        assert!(matches!(
            classify_status(StatusCode::CONFLICT, None),
            ApiError::Server(409)
        ));
    }

    #[test]
    fn test_classify_auth_and_not_found() {
        let id = NoteId::new(5);
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None),
            ApiError::Unauthenticated
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, Some(id)),
            ApiError::Unauthenticated
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, Some(id)),
            ApiError::NotFound(got) if got == id
        ));
    }

    #[test]
    fn test_classify_other_statuses_are_transient_server_errors() {
        let err = classify_status(StatusCode::INTERNAL_SERVER_ERROR, None);
        assert!(matches!(err, ApiError::Server(500)));
        assert!(err.is_transient());

        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, Some(NoteId::new(1)));
        assert!(matches!(err, ApiError::Server(429)));
    }

    #[test]
    fn test_url_shapes() {
        let api = HttpApi::new("http://localhost:8000/", "token");
        assert_eq!(api.notes_url(), "http://localhost:8000/notes/");
        assert_eq!(api.note_url(NoteId::new(3)), "http://localhost:8000/notes/3");
    }
}
