//! API token authentication.

use tracing::info;

use crate::db::User;
use crate::error::{ServiceError, ServiceResult};
use crate::ingestion::compute_content_hash;
use crate::service::DocumentService;

/// Tokens are stored only as SHA-256 hex.
pub fn hash_token(token: &str) -> String {
    compute_content_hash(token.as_bytes())
}

impl DocumentService {
    /// Resolve the user a bearer token belongs to
    pub fn authenticate(&self, token: &str) -> ServiceResult<User> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ServiceError::Unauthorized);
        }

        self.open_session()?
            .find_user_by_token_hash(&hash_token(token))?
            .ok_or(ServiceError::Unauthorized)
    }

    /// Register the users listed in configuration, rotating tokens that changed
    pub fn bootstrap_users(&self) -> ServiceResult<usize> {
        let users = &self.config.auth.users;
        if users.is_empty() {
            return Ok(0);
        }

        let session = self.open_session()?;
        session.in_transaction(|tx| {
            for user in users {
                tx.upsert_user(&user.email, &hash_token(&user.token))?;
            }
            Ok(())
        })?;

        info!(count = users.len(), "Bootstrapped API users");
        Ok(users.len())
    }
}
