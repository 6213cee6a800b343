//! Repository implementations for SQLite-backed persistence.
//!
//! Provides the DocumentStore trait with its SQLite implementation and the
//! SessionArchive that records every ended session.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use uuid::Uuid;

use sahay_core::error::SahayError;
use sahay_core::types::{Document, DocumentMetadata, EndReason, Session, Turn};

use crate::db::Database;

/// Persistent store for knowledge base documents.
///
/// The store is the source of truth; the in-memory retrieval index is
/// rebuilt from it on startup.
pub trait DocumentStore: Send + Sync {
    /// Insert a document, or replace an existing one with the same id.
    fn upsert(&self, doc: &Document) -> Result<(), SahayError>;

    /// Fetch a single document by id.
    fn get(&self, id: Uuid) -> Result<Option<Document>, SahayError>;

    /// Fetch all documents, newest first.
    fn all(&self) -> Result<Vec<Document>, SahayError>;

    /// Delete a document by id. Returns whether a row was removed.
    fn delete(&self, id: Uuid) -> Result<bool, SahayError>;

    /// Count stored documents.
    fn count(&self) -> Result<u64, SahayError>;

    /// Document counts per category, alphabetical by category.
    fn count_by_category(&self) -> Result<Vec<(String, u64)>, SahayError>;
}

/// SQLite-backed document store.
pub struct SqliteDocumentStore {
    db: Arc<Database>,
}

impl SqliteDocumentStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn upsert(&self, doc: &Document) -> Result<(), SahayError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO documents (id, content, embedding, title, category, source, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(id) DO UPDATE SET
                     content = excluded.content,
                     embedding = excluded.embedding,
                     title = excluded.title,
                     category = excluded.category,
                     source = excluded.source",
                rusqlite::params![
                    doc.id.to_string(),
                    doc.content,
                    embedding_to_blob(&doc.embedding),
                    doc.metadata.title,
                    doc.metadata.category,
                    doc.metadata.source,
                    doc.created_at.timestamp(),
                ],
            )
            .map_err(|e| SahayError::Storage(format!("Failed to upsert document: {}", e)))?;
            Ok(())
        })
    }

    fn get(&self, id: Uuid) -> Result<Option<Document>, SahayError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, embedding, title, category, source, created_at
                     FROM documents WHERE id = ?1",
                )
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(rusqlite::params![id.to_string()], |row| {
                    Ok(row_to_document(row))
                })
                .optional()
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            match result {
                Some(doc) => Ok(Some(doc?)),
                None => Ok(None),
            }
        })
    }

    fn all(&self) -> Result<Vec<Document>, SahayError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, content, embedding, title, category, source, created_at
                     FROM documents ORDER BY created_at DESC",
                )
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| Ok(row_to_document(row)))
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let mut docs = Vec::new();
            for row in rows {
                let doc = row.map_err(|e| SahayError::Storage(e.to_string()))??;
                docs.push(doc);
            }
            Ok(docs)
        })
    }

    fn delete(&self, id: Uuid) -> Result<bool, SahayError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM documents WHERE id = ?1",
                    rusqlite::params![id.to_string()],
                )
                .map_err(|e| SahayError::Storage(format!("Failed to delete document: {}", e)))?;
            Ok(affected > 0)
        })
    }

    fn count(&self) -> Result<u64, SahayError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(|e| SahayError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }

    fn count_by_category(&self) -> Result<Vec<(String, u64)>, SahayError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT category, COUNT(*) FROM documents
                     GROUP BY category ORDER BY category",
                )
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    let category: String = row.get(0)?;
                    let count: i64 = row.get(1)?;
                    Ok((category, count as u64))
                })
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let mut counts = Vec::new();
            for row in rows {
                counts.push(row.map_err(|e| SahayError::Storage(e.to_string()))?);
            }
            Ok(counts)
        })
    }
}

/// A session as it was recorded at end-of-life.
#[derive(Debug, Clone)]
pub struct ArchivedSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end_reason: EndReason,
    pub turn_count: usize,
    pub duration_secs: f64,
    pub turns: Vec<Turn>,
}

/// Write-once archive of ended sessions.
pub struct SessionArchive {
    db: Arc<Database>,
}

impl SessionArchive {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Record an ended session.
    pub fn archive(
        &self,
        session: &Session,
        reason: EndReason,
        ended_at: DateTime<Utc>,
    ) -> Result<(), SahayError> {
        let turns_json = serde_json::to_string(&session.turns)?;
        let duration = session.duration_secs(ended_at);
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (id, started_at, ended_at, end_reason, turn_count, duration_secs, turns)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    session.id.to_string(),
                    session.started_at.timestamp(),
                    ended_at.timestamp(),
                    reason.as_str(),
                    session.turns.len() as i64,
                    duration,
                    turns_json,
                ],
            )
            .map_err(|e| SahayError::Storage(format!("Failed to archive session: {}", e)))?;
            Ok(())
        })
    }

    /// Fetch the most recently ended sessions, newest first.
    pub fn recent(&self, limit: u64) -> Result<Vec<ArchivedSession>, SahayError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, started_at, ended_at, end_reason, turn_count, duration_secs, turns
                     FROM sessions ORDER BY ended_at DESC LIMIT ?1",
                )
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![limit], |row| {
                    Ok(row_to_archived_session(row))
                })
                .map_err(|e| SahayError::Storage(e.to_string()))?;

            let mut sessions = Vec::new();
            for row in rows {
                let session = row.map_err(|e| SahayError::Storage(e.to_string()))??;
                sessions.push(session);
            }
            Ok(sessions)
        })
    }

    /// Count archived sessions.
    pub fn count(&self) -> Result<u64, SahayError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
                .map_err(|e| SahayError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

// ===== Row conversion helpers =====

fn row_to_document(row: &rusqlite::Row<'_>) -> Result<Document, SahayError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let content: String = row
        .get(1)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let blob: Vec<u8> = row
        .get(2)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let title: String = row
        .get(3)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let category: String = row
        .get(4)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let source: String = row
        .get(5)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let created_secs: i64 = row
        .get(6)
        .map_err(|e| SahayError::Storage(e.to_string()))?;

    Ok(Document {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| SahayError::Storage(format!("Invalid document id: {}", e)))?,
        content,
        embedding: blob_to_embedding(&blob)?,
        metadata: DocumentMetadata {
            title,
            category,
            source,
        },
        created_at: parse_timestamp(created_secs)?,
    })
}

fn row_to_archived_session(row: &rusqlite::Row<'_>) -> Result<ArchivedSession, SahayError> {
    let id_str: String = row
        .get(0)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let started_secs: i64 = row
        .get(1)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let ended_secs: i64 = row
        .get(2)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let reason_str: String = row
        .get(3)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let turn_count: i64 = row
        .get(4)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let duration_secs: f64 = row
        .get(5)
        .map_err(|e| SahayError::Storage(e.to_string()))?;
    let turns_json: String = row
        .get(6)
        .map_err(|e| SahayError::Storage(e.to_string()))?;

    Ok(ArchivedSession {
        id: Uuid::parse_str(&id_str)
            .map_err(|e| SahayError::Storage(format!("Invalid session id: {}", e)))?,
        started_at: parse_timestamp(started_secs)?,
        ended_at: parse_timestamp(ended_secs)?,
        end_reason: parse_end_reason(&reason_str)?,
        turn_count: turn_count as usize,
        duration_secs,
        turns: serde_json::from_str(&turns_json)?,
    })
}

fn parse_timestamp(secs: i64) -> Result<DateTime<Utc>, SahayError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| SahayError::Storage(format!("Invalid timestamp: {}", secs)))
}

fn parse_end_reason(s: &str) -> Result<EndReason, SahayError> {
    match s {
        "idle_timeout" => Ok(EndReason::IdleTimeout),
        "manual_exit" => Ok(EndReason::ManualExit),
        "repeated_failure" => Ok(EndReason::RepeatedFailure),
        "shutdown" => Ok(EndReason::Shutdown),
        other => Err(SahayError::Storage(format!(
            "Unknown end reason: {}",
            other
        ))),
    }
}

/// Serialize an embedding as little-endian f32 bytes.
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>, SahayError> {
    if blob.len() % 4 != 0 {
        return Err(SahayError::Storage(format!(
            "Embedding blob length {} is not a multiple of 4",
            blob.len()
        )));
    }
    Ok(blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}
