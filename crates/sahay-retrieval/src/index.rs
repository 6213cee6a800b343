//! In-memory document index with copy-on-write snapshots.
//!
//! Writers build a fresh vector and swap it in under a short write lock.
//! Readers clone an `Arc` and scan without holding any lock, so a query
//! always sees one internally consistent state of the index.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use sahay_core::error::SahayError;
use sahay_core::types::Document;

/// One indexed document: just the fields scoring needs.
#[derive(Debug, Clone)]
pub struct IndexedDocument {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub created_at: DateTime<Utc>,
    pub category: String,
}

/// Copy-on-write index over document embeddings.
pub struct DocumentIndex {
    dimensions: usize,
    entries: RwLock<Arc<Vec<IndexedDocument>>>,
}

impl DocumentIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Arc::new(Vec::new())),
        }
    }

    /// The embedding dimensionality this index accepts.
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Insert a document's embedding, replacing any entry with the same id.
    pub fn upsert(&self, doc: &Document) -> Result<(), SahayError> {
        if doc.embedding.len() != self.dimensions {
            return Err(SahayError::Retrieval(format!(
                "Embedding dimension {} does not match index dimension {}",
                doc.embedding.len(),
                self.dimensions
            )));
        }

        let entry = IndexedDocument {
            id: doc.id,
            embedding: doc.embedding.clone(),
            created_at: doc.created_at,
            category: doc.metadata.category.clone(),
        };

        let mut guard = self
            .entries
            .write()
            .map_err(|e| SahayError::Retrieval(format!("Index lock poisoned: {}", e)))?;
        let mut next: Vec<IndexedDocument> =
            guard.iter().filter(|e| e.id != doc.id).cloned().collect();
        next.push(entry);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Remove a document by id. Returns whether an entry was removed.
    pub fn remove(&self, id: Uuid) -> Result<bool, SahayError> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| SahayError::Retrieval(format!("Index lock poisoned: {}", e)))?;
        let before = guard.len();
        let next: Vec<IndexedDocument> = guard.iter().filter(|e| e.id != id).cloned().collect();
        let removed = next.len() < before;
        *guard = Arc::new(next);
        Ok(removed)
    }

    /// Replace the whole index from a document set, skipping documents whose
    /// embedding dimension does not match.
    pub fn rebuild(&self, docs: &[Document]) -> Result<usize, SahayError> {
        let entries: Vec<IndexedDocument> = docs
            .iter()
            .filter(|d| d.embedding.len() == self.dimensions)
            .map(|d| IndexedDocument {
                id: d.id,
                embedding: d.embedding.clone(),
                created_at: d.created_at,
                category: d.metadata.category.clone(),
            })
            .collect();
        let count = entries.len();

        let mut guard = self
            .entries
            .write()
            .map_err(|e| SahayError::Retrieval(format!("Index lock poisoned: {}", e)))?;
        *guard = Arc::new(entries);
        Ok(count)
    }

    /// Take a consistent snapshot of the index contents.
    pub fn snapshot(&self) -> Result<Arc<Vec<IndexedDocument>>, SahayError> {
        let guard = self
            .entries
            .read()
            .map_err(|e| SahayError::Retrieval(format!("Index lock poisoned: {}", e)))?;
        Ok(Arc::clone(&guard))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DocumentIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentIndex")
            .field("dimensions", &self.dimensions)
            .field("len", &self.len())
            .finish()
    }
}

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += (*x as f64) * (*y as f64);
        norm_a += (*x as f64) * (*x as f64);
        norm_b += (*y as f64) * (*y as f64);
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
