//! Shared domain types for the kiosk orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A knowledge-base document with its embedding.
///
/// Owned exclusively by the document store. Immutable once stored except
/// for re-embedding on content update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub content: String,
    /// Fixed-length embedding vector. All documents in one store share the
    /// same dimensionality.
    pub embedding: Vec<f32>,
    pub metadata: DocumentMetadata,
    pub created_at: DateTime<Utc>,
}

/// Descriptive metadata attached to a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    pub category: String,
    pub source: String,
}

/// One user-input/system-response exchange within a session.
///
/// Appended only by the pipeline coordinator, never mutated after append.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub user_text: String,
    pub response_text: String,
    /// IDs of the documents that grounded the response, in rank order.
    pub retrieved_doc_ids: Vec<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub error: bool,
}

/// A transient retrieval hit: document id and cosine similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub doc_id: Uuid,
    pub score: f64,
}

/// Lifecycle state of the single kiosk session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Active,
    Closing,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    IdleTimeout,
    ManualExit,
    RepeatedFailure,
    Shutdown,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::IdleTimeout => "idle_timeout",
            EndReason::ManualExit => "manual_exit",
            EndReason::RepeatedFailure => "repeated_failure",
            EndReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One kiosk conversation, from presence activation to close.
///
/// At most one session is in a non-terminal state at any instant. The turn
/// sequence is append-only and time-ordered; `last_activity_at` never moves
/// backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub turns: Vec<Turn>,
}

impl Session {
    /// Create a fresh active session with a unique id and empty turns.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: SessionState::Active,
            started_at: now,
            last_activity_at: now,
            turns: Vec::new(),
        }
    }

    /// Record activity, keeping `last_activity_at` monotonically
    /// non-decreasing.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }

    /// Append a turn and update activity from its timestamp.
    pub fn push_turn(&mut self, turn: Turn) {
        self.touch(turn.timestamp);
        self.turns.push(turn);
    }

    /// Session duration in seconds, measured against `now`.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}
