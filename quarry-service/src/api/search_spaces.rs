//! Search space API endpoints.

use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
};
use serde::Deserialize;
use std::sync::Arc;

use crate::db::SearchSpace;
use crate::error::ServiceError;

use super::auth::CurrentUser;
use super::{AppState, MessageResponse, bad_request};

#[derive(Deserialize)]
pub struct CreateSearchSpaceRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn create_search_space_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    request: Result<Json<CreateSearchSpaceRequest>, JsonRejection>,
) -> Result<Json<SearchSpace>, ServiceError> {
    let Json(request) = request.map_err(bad_request)?;
    let space = state
        .service
        .create_search_space(&user, &request.name, request.description.as_deref())
        .map_err(|e| e.context("Failed to create search space"))?;
    Ok(Json(space))
}

pub async fn list_search_spaces_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<SearchSpace>>, ServiceError> {
    let spaces = state
        .service
        .list_search_spaces(&user)
        .map_err(|e| e.context("Failed to fetch search spaces"))?;
    Ok(Json(spaces))
}

pub async fn get_search_space_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<SearchSpace>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    let space = state
        .service
        .get_search_space(&user, id)
        .map_err(|e| e.context("Failed to fetch search space"))?;
    Ok(Json(space))
}

/// Delete a search space along with its documents and jobs
pub async fn delete_search_space_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    state
        .service
        .delete_search_space(&user, id)
        .map_err(|e| e.context("Failed to delete search space"))?;
    Ok(MessageResponse::new("Search space deleted successfully"))
}
