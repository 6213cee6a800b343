//! Retrieval engine and document ingestor.
//!
//! The engine embeds queries and ranks index snapshots by cosine similarity.
//! The ingestor is the single write path for documents: it embeds content,
//! persists to the store, and keeps the index in sync.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};
use uuid::Uuid;

use sahay_core::error::SahayError;
use sahay_core::types::{Document, DocumentMetadata, RetrievalResult};
use sahay_store::DocumentStore;

use crate::embedding::DynEmbeddingService;
use crate::index::{cosine_similarity, DocumentIndex};

/// The outcome of a retrieval: ranked hits, or a miss when nothing cleared
/// the relevance threshold.
///
/// A miss is an ordinary outcome, not an error. Downstream generation runs
/// without excerpts when it occurs.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    Hits(Vec<RetrievalResult>),
    Miss,
}

impl RetrievalOutcome {
    pub fn is_miss(&self) -> bool {
        matches!(self, RetrievalOutcome::Miss)
    }

    /// The ranked results, empty on a miss.
    pub fn results(&self) -> &[RetrievalResult] {
        match self {
            RetrievalOutcome::Hits(results) => results,
            RetrievalOutcome::Miss => &[],
        }
    }
}

/// Ranks documents against a query by cosine similarity.
pub struct RetrievalEngine {
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn DynEmbeddingService>,
    min_similarity: f64,
}

impl RetrievalEngine {
    pub fn new(
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn DynEmbeddingService>,
        min_similarity: f64,
    ) -> Self {
        Self {
            index,
            embedder,
            min_similarity,
        }
    }

    /// Retrieve the top `k` documents for a pre-computed query embedding.
    ///
    /// Results are ordered by similarity descending; equal scores fall back
    /// to newest document first. Documents scoring below the relevance
    /// threshold are excluded even when fewer than `k` remain.
    pub fn retrieve(
        &self,
        query: &[f32],
        k: usize,
    ) -> Result<RetrievalOutcome, SahayError> {
        self.retrieve_filtered(query, k, None)
    }

    /// Retrieve with an optional category filter applied before ranking.
    pub fn retrieve_filtered(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<RetrievalOutcome, SahayError> {
        if k == 0 {
            return Err(SahayError::Input(
                "Retrieval count must be at least 1".to_string(),
            ));
        }
        if query.len() != self.index.dimensions() {
            return Err(SahayError::Retrieval(format!(
                "Query dimension {} does not match index dimension {}",
                query.len(),
                self.index.dimensions()
            )));
        }

        let snapshot = self.index.snapshot()?;

        let mut scored: Vec<(RetrievalResult, chrono::DateTime<Utc>)> = snapshot
            .iter()
            .filter(|entry| category.map_or(true, |c| entry.category == c))
            .map(|entry| {
                let score = cosine_similarity(query, &entry.embedding);
                (
                    RetrievalResult {
                        doc_id: entry.id,
                        score,
                    },
                    entry.created_at,
                )
            })
            .filter(|(result, _)| result.score >= self.min_similarity)
            .collect();

        scored.sort_by(|(a, a_created), (b, b_created)| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b_created.cmp(a_created))
        });
        scored.truncate(k);

        debug!(
            candidates = snapshot.len(),
            hits = scored.len(),
            "Retrieval pass complete"
        );

        if scored.is_empty() {
            Ok(RetrievalOutcome::Miss)
        } else {
            Ok(RetrievalOutcome::Hits(
                scored.into_iter().map(|(result, _)| result).collect(),
            ))
        }
    }

    /// Embed a text query and retrieve against it.
    pub async fn retrieve_text(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalOutcome, SahayError> {
        let query_vec = self.embedder.embed_boxed(query).await?;
        self.retrieve(&query_vec, k)
    }
}

/// Single write path for the knowledge base.
///
/// Every document mutation goes through here so that the store and the
/// index never disagree about a document's embedding.
pub struct DocumentIngestor {
    store: Arc<dyn DocumentStore>,
    index: Arc<DocumentIndex>,
    embedder: Arc<dyn DynEmbeddingService>,
}

impl DocumentIngestor {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        index: Arc<DocumentIndex>,
        embedder: Arc<dyn DynEmbeddingService>,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
        }
    }

    /// Embed and store a new document.
    pub async fn ingest(
        &self,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<Document, SahayError> {
        if content.trim().is_empty() {
            return Err(SahayError::Input(
                "Document content must not be empty".to_string(),
            ));
        }

        let embedding = self.embedder.embed_boxed(content).await?;
        let doc = Document {
            id: Uuid::new_v4(),
            content: content.to_string(),
            embedding,
            metadata,
            created_at: Utc::now(),
        };

        self.store.upsert(&doc)?;
        self.index.upsert(&doc)?;
        info!(doc_id = %doc.id, title = %doc.metadata.title, "Document ingested");
        Ok(doc)
    }

    /// Re-embed and replace an existing document's content.
    pub async fn update(
        &self,
        id: Uuid,
        content: &str,
        metadata: DocumentMetadata,
    ) -> Result<Document, SahayError> {
        let existing = self
            .store
            .get(id)?
            .ok_or_else(|| SahayError::Input(format!("Unknown document: {}", id)))?;

        let embedding = self.embedder.embed_boxed(content).await?;
        let doc = Document {
            id,
            content: content.to_string(),
            embedding,
            metadata,
            created_at: existing.created_at,
        };

        self.store.upsert(&doc)?;
        self.index.upsert(&doc)?;
        Ok(doc)
    }

    /// Remove a document from the store and the index.
    pub fn remove(&self, id: Uuid) -> Result<bool, SahayError> {
        let removed = self.store.delete(id)?;
        self.index.remove(id)?;
        Ok(removed)
    }

    /// Rebuild the index from the store. Called once at startup.
    pub fn load_from_store(&self) -> Result<usize, SahayError> {
        let docs = self.store.all()?;
        let loaded = self.index.rebuild(&docs)?;
        info!(documents = loaded, "Retrieval index loaded");
        Ok(loaded)
    }
}
