//! Database schema migrations.
//!
//! This module contains all database migrations and schema setup.

use rusqlite::Connection;

use crate::error::{DatabaseError, ServiceResult};

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Run all database migrations.
///
/// This function is called during database initialization to ensure
/// the schema is up to date.
pub(super) fn run_migrations(conn: &Connection) -> ServiceResult<()> {
    let version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(DatabaseError::Query)?;

    if version > SCHEMA_VERSION {
        return Err(DatabaseError::Migration {
            message: format!(
                "database schema version {} is newer than supported version {}",
                version, SCHEMA_VERSION
            ),
        }
        .into());
    }

    // Initial schema setup
    conn.execute_batch(
        r#"
        -- Users, authenticated by API token hash
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            api_token_hash TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL
        );

        -- Search spaces (tenant boundary)
        CREATE TABLE IF NOT EXISTS search_spaces (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            description TEXT,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_search_spaces_user ON search_spaces(user_id);

        -- Documents table
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            search_space_id INTEGER NOT NULL,
            title TEXT NOT NULL,
            document_type TEXT NOT NULL,
            document_metadata TEXT NOT NULL DEFAULT '{}',
            content TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY (search_space_id) REFERENCES search_spaces(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_documents_search_space ON documents(search_space_id);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_space_hash
            ON documents(search_space_id, content_hash);

        -- Chunks table
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            document_id INTEGER NOT NULL,
            content TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);

        -- Durable ingestion queue
        CREATE TABLE IF NOT EXISTS ingestion_jobs (
            id TEXT PRIMARY KEY,
            search_space_id INTEGER NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            attempts INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            document_id INTEGER,
            staged_path TEXT,
            available_at INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            FOREIGN KEY (search_space_id) REFERENCES search_spaces(id) ON DELETE CASCADE,
            FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE SET NULL
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_status ON ingestion_jobs(status, available_at);
        CREATE INDEX IF NOT EXISTS idx_jobs_search_space ON ingestion_jobs(search_space_id);
        "#,
    )
    .map_err(|e| DatabaseError::Migration {
        message: e.to_string(),
    })?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
        .map_err(DatabaseError::Query)?;

    Ok(())
}
