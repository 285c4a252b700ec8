//! User lookups for API token authentication.

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::models::User;
use super::{Session, format_timestamp};
use crate::error::{DatabaseError, ServiceResult};

impl Session {
    /// Create a user or rotate the token hash of an existing one (matched by email).
    pub fn upsert_user(&self, email: &str, api_token_hash: &str) -> ServiceResult<User> {
        let id = uuid::Uuid::new_v4().to_string();

        self.conn
            .execute(
                r#"
                INSERT INTO users (id, email, api_token_hash, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(email) DO UPDATE SET api_token_hash = excluded.api_token_hash
                "#,
                params![id, email, api_token_hash, format_timestamp(Utc::now())],
            )
            .map_err(DatabaseError::Query)?;

        self.conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE email = ?1",
                params![email],
                User::from_row,
            )
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Resolve a user from the SHA-256 hash of their bearer token
    pub fn find_user_by_token_hash(&self, api_token_hash: &str) -> ServiceResult<Option<User>> {
        self.conn
            .query_row(
                "SELECT id, email, created_at FROM users WHERE api_token_hash = ?1",
                params![api_token_hash],
                User::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }
}
