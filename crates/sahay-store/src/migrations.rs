//! Database schema migrations.
//!
//! Applies the initial schema: the documents knowledge base, the sessions
//! archive, and the schema_migrations tracking table.

use rusqlite::Connection;
use tracing::info;

use sahay_core::error::SahayError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental changes.
pub fn run_migrations(conn: &Connection) -> Result<(), SahayError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| SahayError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| SahayError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), SahayError> {
    conn.execute_batch(
        "
        -- Knowledge base documents with their embedding vectors.
        CREATE TABLE IF NOT EXISTS documents (
            id          TEXT PRIMARY KEY NOT NULL,
            content     TEXT NOT NULL,
            embedding   BLOB NOT NULL,
            title       TEXT NOT NULL DEFAULT '',
            category    TEXT NOT NULL DEFAULT '',
            source      TEXT NOT NULL DEFAULT '',
            created_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_documents_created_at
            ON documents (created_at DESC);

        CREATE INDEX IF NOT EXISTS idx_documents_category
            ON documents (category);

        -- Archive of ended sessions. Turns are stored as a JSON array.
        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY NOT NULL,
            started_at      INTEGER NOT NULL,
            ended_at        INTEGER NOT NULL,
            end_reason      TEXT NOT NULL
                            CHECK (end_reason IN
                                ('idle_timeout', 'manual_exit', 'repeated_failure', 'shutdown')),
            turn_count      INTEGER NOT NULL DEFAULT 0,
            duration_secs   REAL NOT NULL DEFAULT 0.0,
            turns           TEXT NOT NULL DEFAULT '[]'
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_ended_at
            ON sessions (ended_at DESC);

        -- Record migration.
        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| SahayError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        conn
    }

    #[test]
    fn test_migrations_run_once() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        // Running again should be idempotent.
        run_migrations(&conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(version, 1);
    }

    #[test]
    fn test_documents_table_exists() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO documents (id, content, embedding, title, category, created_at)
             VALUES ('doc-1', 'hello', X'00000000', 'Greeting', 'general', 1700000000)",
            [],
        )
        .unwrap();

        let content: String = conn
            .query_row(
                "SELECT content FROM documents WHERE id = 'doc-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    fn test_sessions_table_exists() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        conn.execute(
            "INSERT INTO sessions (id, started_at, ended_at, end_reason, turn_count, duration_secs)
             VALUES ('sess-1', 1700000000, 1700000042, 'idle_timeout', 3, 42.0)",
            [],
        )
        .unwrap();

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_sessions_end_reason_check() {
        let conn = open_test_conn();
        run_migrations(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO sessions (id, started_at, ended_at, end_reason)
             VALUES ('bad', 0, 1, 'invalid')",
            [],
        );
        assert!(result.is_err());
    }
}
