//! Route handler functions for all API endpoints.
//!
//! Each handler extracts parameters via axum extractors, calls into the
//! coordinator or its services, and returns JSON responses.

use axum::extract::{Path, Query, State};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use sahay_core::types::{Document, DocumentMetadata, EndReason, Turn};
use sahay_pipeline::InteractionInput;
use sahay_store::ArchivedSession;

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request and query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct InteractRequest {
    /// Typed input. Exactly one of `text` and `audio_b64` must be set.
    pub text: Option<String>,
    /// Base64-encoded audio clip for speech recognition.
    pub audio_b64: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub present: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateDocumentRequest {
    pub content: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub source: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionHistoryParams {
    pub limit: Option<u64>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub session_state: String,
    pub presence: bool,
    pub document_count: u64,
    pub archived_sessions: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InteractResponse {
    pub session_id: Uuid,
    pub user_text: String,
    pub response_text: String,
    pub retrieved_doc_ids: Vec<Uuid>,
    pub error: bool,
    pub recorded: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresenceResponse {
    pub presence: bool,
    pub session_state: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub id: Uuid,
    pub state: String,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turn_count: usize,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionEndResponse {
    pub id: Uuid,
    pub reason: String,
    pub turn_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub content: String,
    pub title: String,
    pub category: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl From<Document> for DocumentResponse {
    fn from(doc: Document) -> Self {
        Self {
            id: doc.id,
            content: doc.content,
            title: doc.metadata.title,
            category: doc.metadata.category,
            source: doc.metadata.source,
            created_at: doc.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DocumentListResponse {
    pub documents: Vec<DocumentResponse>,
    pub total: u64,
    pub categories: Vec<CategoryCount>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ArchivedSessionResponse {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: String,
    pub turn_count: usize,
    pub duration_secs: f64,
}

impl From<ArchivedSession> for ArchivedSessionResponse {
    fn from(session: ArchivedSession) -> Self {
        Self {
            id: session.id,
            started_at: session.started_at,
            ended_at: session.ended_at,
            end_reason: session.end_reason.as_str().to_string(),
            turn_count: session.turn_count,
            duration_secs: session.duration_secs,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionHistoryResponse {
    pub sessions: Vec<ArchivedSessionResponse>,
}

// =============================================================================
// Handler functions
// =============================================================================

/// GET /health - service status and counters.
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let document_count = state.store.count()?;
    let archived_sessions = state.archive.count()?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        session_state: state.sessions.state().as_str().to_string(),
        presence: state.sessions.presence(),
        document_count,
        archived_sessions,
    }))
}

/// POST /interact - run one typed or spoken interaction through the pipeline.
pub async fn interact(
    State(state): State<AppState>,
    Json(req): Json<InteractRequest>,
) -> Result<Json<InteractResponse>, ApiError> {
    let input = match (req.text, req.audio_b64) {
        (Some(text), None) => InteractionInput::Text(text),
        (None, Some(encoded)) => {
            let audio = BASE64_STANDARD.decode(encoded.as_bytes()).map_err(|e| {
                ApiError::BadRequest(format!("Field 'audio_b64' is not valid base64: {}", e))
            })?;
            InteractionInput::Audio(audio)
        }
        _ => {
            return Err(ApiError::BadRequest(
                "Exactly one of 'text' and 'audio_b64' must be provided".to_string(),
            ))
        }
    };

    let output = state.coordinator.submit(input).await?;

    Ok(Json(InteractResponse {
        session_id: output.session_id,
        user_text: output.user_text,
        response_text: output.response_text,
        retrieved_doc_ids: output.retrieved_doc_ids,
        error: output.error,
        recorded: output.recorded,
    }))
}

/// POST /presence - feed one raw presence sample through the debouncer.
pub async fn presence(
    State(state): State<AppState>,
    Json(req): Json<PresenceRequest>,
) -> Result<Json<PresenceResponse>, ApiError> {
    state
        .sessions
        .presence_sample(req.present, Utc::now())
        .map_err(sahay_core::error::SahayError::from)?;

    Ok(Json(PresenceResponse {
        presence: state.sessions.presence(),
        session_state: state.sessions.state().as_str().to_string(),
    }))
}

/// GET /session - the current session, 404 when idle.
pub async fn get_session(
    State(state): State<AppState>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .sessions
        .current()
        .map_err(sahay_core::error::SahayError::from)?
        .ok_or_else(|| ApiError::NotFound("No active session".to_string()))?;

    Ok(Json(SessionResponse {
        id: session.id,
        state: session.state.as_str().to_string(),
        started_at: session.started_at,
        last_activity_at: session.last_activity_at,
        turn_count: session.turns.len(),
        turns: session.turns,
    }))
}

/// POST /session/end - end the current session as a manual exit.
pub async fn end_session(
    State(state): State<AppState>,
) -> Result<Json<SessionEndResponse>, ApiError> {
    let session = state.coordinator.end_session(EndReason::ManualExit)?;

    Ok(Json(SessionEndResponse {
        id: session.id,
        reason: EndReason::ManualExit.as_str().to_string(),
        turn_count: session.turns.len(),
    }))
}

/// POST /documents - ingest a knowledge-base document.
pub async fn create_document(
    State(state): State<AppState>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Field 'title' must not be empty".to_string(),
        ));
    }

    let metadata = DocumentMetadata {
        title: req.title,
        category: req.category,
        source: req.source,
    };
    let doc = state.ingestor.ingest(&req.content, metadata).await?;
    Ok(Json(DocumentResponse::from(doc)))
}

/// PUT /documents/{id} - replace a document's content and re-embed it.
pub async fn update_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Field 'title' must not be empty".to_string(),
        ));
    }

    if state.store.get(id)?.is_none() {
        return Err(ApiError::NotFound(format!("Document {} not found", id)));
    }

    let metadata = DocumentMetadata {
        title: req.title,
        category: req.category,
        source: req.source,
    };
    let doc = state.ingestor.update(id, &req.content, metadata).await?;
    Ok(Json(DocumentResponse::from(doc)))
}

/// GET /documents - list all documents, newest first.
pub async fn list_documents(
    State(state): State<AppState>,
) -> Result<Json<DocumentListResponse>, ApiError> {
    let docs = state.store.all()?;
    let total = docs.len() as u64;
    let documents = docs.into_iter().map(DocumentResponse::from).collect();
    let categories = state
        .store
        .count_by_category()?
        .into_iter()
        .map(|(category, count)| CategoryCount { category, count })
        .collect();

    Ok(Json(DocumentListResponse {
        documents,
        total,
        categories,
    }))
}

/// DELETE /documents/{id} - remove a document from the store and index.
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let removed = state.ingestor.remove(id)?;
    if !removed {
        return Err(ApiError::NotFound(format!("Document {} not found", id)));
    }
    Ok(Json(serde_json::json!({ "deleted": id })))
}

/// GET /sessions - recently ended sessions, newest first.
pub async fn session_history(
    State(state): State<AppState>,
    Query(params): Query<SessionHistoryParams>,
) -> Result<Json<SessionHistoryResponse>, ApiError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let sessions = state
        .archive
        .recent(limit)?
        .into_iter()
        .map(ArchivedSessionResponse::from)
        .collect();

    Ok(Json(SessionHistoryResponse { sessions }))
}
