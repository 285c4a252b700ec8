//! Database module for SQLite operations.
//!
//! A [`Database`] knows where the SQLite file lives and hands out
//! [`Session`]s: one connection per request or background job, so that
//! independent units of work never share a transaction. Query methods live
//! on `Session` and are organized into submodules by domain.

mod chunks;
mod documents;
mod jobs;
mod migrations;
pub mod models;
mod search_spaces;
mod users;

pub use documents::{DocumentChanges, NewDocument};
pub use jobs::JobFilter;
pub use models::{Document, DocumentType, IngestionJob, JobStatus, SearchSpace, User};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{DatabaseError, ServiceError, ServiceResult};

/// How long a session waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens database sessions.
///
/// Request handlers and ingestion workers receive this capability instead of
/// reaching for a global connection, and open a fresh session per unit of work.
pub trait SessionProvider: Send + Sync {
    fn open_session(&self) -> ServiceResult<Session>;
}

/// Database manager for SQLite operations
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open or create the database at the given path and run migrations
    pub fn open(path: &Path) -> ServiceResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ServiceError::Database(DatabaseError::Connection(
                    rusqlite::Error::ToSqlConversionFailure(Box::new(e)),
                ))
            })?;
        }

        let session = Session::connect(path)?;

        // Run all migrations
        migrations::run_migrations(&session.conn)?;

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionProvider for Database {
    fn open_session(&self) -> ServiceResult<Session> {
        Session::connect(&self.path)
    }
}

/// A single database connection scoped to one unit of work
pub struct Session {
    conn: Connection,
}

impl Session {
    fn connect(path: &Path) -> ServiceResult<Self> {
        let conn = Connection::open(path).map_err(DatabaseError::Connection)?;

        // Enable WAL mode for better concurrency between sessions
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(DatabaseError::Query)?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(DatabaseError::Connection)?;

        Ok(Self { conn })
    }

    /// Run `f` inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`, rolls back otherwise. Transactions must not
    /// be nested.
    pub fn in_transaction<T>(
        &self,
        f: impl FnOnce(&Session) -> ServiceResult<T>,
    ) -> ServiceResult<T> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(DatabaseError::Query)?;

        match f(self) {
            Ok(value) => {
                if let Err(e) = self.conn.execute_batch("COMMIT") {
                    self.rollback();
                    return Err(DatabaseError::Query(e).into());
                }
                Ok(value)
            }
            Err(e) => {
                self.rollback();
                Err(e)
            }
        }
    }

    fn rollback(&self) {
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Failed to roll back transaction");
        }
    }
}

/// Format a timestamp the way every table stores it.
pub(crate) fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

/// Parse a stored timestamp, falling back to now for unreadable values.
pub(crate) fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
