//! Search space operations and ownership checks.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::models::SearchSpace;
use super::{Session, format_timestamp};
use crate::error::{DatabaseError, ServiceError, ServiceResult};

const SEARCH_SPACE_COLUMNS: &str = "s.id, s.name, s.description, s.user_id, s.created_at";

impl Session {
    /// Create a search space owned by `user_id`
    pub fn insert_search_space(
        &self,
        user_id: &str,
        name: &str,
        description: Option<&str>,
    ) -> ServiceResult<SearchSpace> {
        let now = Utc::now();

        self.conn
            .execute(
                "INSERT INTO search_spaces (name, description, user_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![name, description, user_id, format_timestamp(now)],
            )
            .map_err(DatabaseError::Query)?;

        Ok(SearchSpace {
            id: self.conn.last_insert_rowid(),
            name: name.to_string(),
            description: description.map(String::from),
            user_id: user_id.to_string(),
            created_at: now,
        })
    }

    /// List the search spaces a user owns
    pub fn list_search_spaces(&self, user_id: &str) -> ServiceResult<Vec<SearchSpace>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {SEARCH_SPACE_COLUMNS} FROM search_spaces s WHERE s.user_id = ?1 ORDER BY s.id"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params![user_id], SearchSpace::from_row)
            .map_err(DatabaseError::Query)?;

        let mut spaces = Vec::new();
        for row in rows {
            spaces.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(spaces)
    }

    /// Get a search space if it exists and belongs to `user_id`
    pub fn get_owned_search_space(
        &self,
        search_space_id: i64,
        user_id: &str,
    ) -> ServiceResult<Option<SearchSpace>> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {SEARCH_SPACE_COLUMNS} FROM search_spaces s WHERE s.id = ?1 AND s.user_id = ?2"
                ),
                params![search_space_id, user_id],
                SearchSpace::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Ownership check: a missing space and someone else's space look the same.
    pub fn require_owned_search_space(
        &self,
        search_space_id: i64,
        user_id: &str,
    ) -> ServiceResult<SearchSpace> {
        self.get_owned_search_space(search_space_id, user_id)?
            .ok_or(ServiceError::SearchSpaceNotFound { search_space_id })
    }

    /// Whether a search space still exists, regardless of owner
    pub fn search_space_exists(&self, search_space_id: i64) -> ServiceResult<bool> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM search_spaces WHERE id = ?1",
                params![search_space_id],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;
        Ok(count > 0)
    }

    /// Delete an owned search space; documents, chunks and jobs cascade
    pub fn delete_search_space(&self, search_space_id: i64, user_id: &str) -> ServiceResult<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM search_spaces WHERE id = ?1 AND user_id = ?2",
                params![search_space_id, user_id],
            )
            .map_err(DatabaseError::Query)?;

        Ok(rows > 0)
    }
}
