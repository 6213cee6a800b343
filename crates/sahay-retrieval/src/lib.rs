//! Sahay Retrieval crate - embeddings, the in-memory document index, and
//! the cosine-similarity retrieval engine.
//!
//! The index is rebuilt from the document store on startup and kept in sync
//! by the ingestor on every document write.

pub mod embedding;
pub mod engine;
pub mod index;

pub use embedding::{DynEmbeddingService, EmbeddingService, HashEmbedding};
pub use engine::{DocumentIngestor, RetrievalEngine, RetrievalOutcome};
pub use index::{cosine_similarity, DocumentIndex, IndexedDocument};
