//! Bearer token authentication for API routes.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Bearer};
use std::sync::Arc;
use tracing::debug;

use crate::db::User;
use crate::error::ServiceError;

use super::AppState;

/// The user behind the request's `Authorization: Bearer` token.
///
/// Rejects with 401 when the header is missing, malformed, or names no user.
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|rejection| {
                    debug!(reason = %rejection, "Missing or malformed bearer token");
                    ServiceError::Unauthorized
                })?;

        let user = state
            .service
            .authenticate(bearer.token())
            .map_err(|e| e.context("Failed to authenticate"))?;

        Ok(CurrentUser(user))
    }
}
