//! Sahay Store crate - SQLite persistence for documents and archived sessions.
//!
//! Provides a WAL-mode SQLite database with migrations, the DocumentStore
//! trait with its SQLite implementation, and the SessionArchive that keeps
//! a record of every ended session.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{ArchivedSession, DocumentStore, SessionArchive, SqliteDocumentStore};
