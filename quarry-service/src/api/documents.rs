//! Document API endpoints.
//!
//! Handlers for structured submission, multipart upload, listing,
//! update and delete.

use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Document;
use crate::error::ServiceError;
use crate::service::{DocumentUpdate, UploadedFile};

use super::auth::CurrentUser;
use super::{AppState, MessageResponse, bad_request};

/// Structured content submission
#[derive(Deserialize)]
pub struct CreateDocumentsRequest {
    pub document_type: String,
    pub content: Vec<serde_json::Value>,
    pub search_space_id: i64,
}

/// Response for operations that schedule ingestion jobs
#[derive(Serialize)]
pub struct JobsScheduledResponse {
    pub message: String,
    pub job_ids: Vec<String>,
}

/// List documents query parameters
#[derive(Deserialize)]
pub struct ListDocumentsParams {
    pub skip: Option<u32>,
    pub limit: Option<u32>,
    pub search_space_id: Option<i64>,
}

/// Schedule ingestion of structured content
pub async fn create_documents_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    request: Result<Json<CreateDocumentsRequest>, JsonRejection>,
) -> Result<Json<JobsScheduledResponse>, ServiceError> {
    let Json(request) = request.map_err(bad_request)?;

    let job_ids = state
        .service
        .submit_documents(
            &user,
            request.search_space_id,
            &request.document_type,
            request.content,
        )
        .map_err(|e| e.context("Failed to process documents"))?;

    Ok(Json(JobsScheduledResponse {
        message: "Documents processed successfully".to_string(),
        job_ids,
    }))
}

/// Stage uploaded files and schedule their ingestion.
///
/// Accepts any number of `files` parts (`files[]` and `file` also work) and a
/// `search_space_id` field.
pub async fn upload_files_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<JobsScheduledResponse>, ServiceError> {
    let mut multipart = multipart.map_err(bad_request)?;
    let mut files: Vec<UploadedFile> = Vec::new();
    let mut search_space_id: Option<i64> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "files" | "files[]" | "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                files.push(UploadedFile { filename, data });
            }
            "search_space_id" => {
                let value = field.text().await.map_err(multipart_error)?;
                let id = value.trim().parse::<i64>().map_err(|_| ServiceError::InvalidRequest {
                    message: format!("Invalid search_space_id: {}", value),
                })?;
                search_space_id = Some(id);
            }
            _ => {}
        }
    }

    let search_space_id = search_space_id.ok_or_else(|| ServiceError::InvalidRequest {
        message: "search_space_id is required".to_string(),
    })?;

    let job_ids = state
        .service
        .stage_uploads(&user, search_space_id, files)
        .map_err(|e| e.context("Failed to upload files"))?;

    Ok(Json(JobsScheduledResponse {
        message: "Files uploaded for processing".to_string(),
        job_ids,
    }))
}

/// Multipart read failures; an exceeded body limit keeps its 413
fn multipart_error(e: MultipartError) -> ServiceError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServiceError::PayloadTooLarge {
            message: e.body_text(),
        }
    } else {
        bad_request(e.body_text())
    }
}

/// List documents owned by the caller
pub async fn list_documents_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<ListDocumentsParams>, QueryRejection>,
) -> Result<Json<Vec<Document>>, ServiceError> {
    let Query(params) = params.map_err(bad_request)?;
    let documents = state
        .service
        .list_documents(&user, params.search_space_id, params.skip, params.limit)
        .map_err(|e| e.context("Failed to fetch documents"))?;
    Ok(Json(documents))
}

/// Get a specific document by ID
pub async fn get_document_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<Document>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    let document = state
        .service
        .get_document(&user, id)
        .map_err(|e| e.context("Failed to fetch document"))?;
    Ok(Json(document))
}

/// Partially update a document
pub async fn update_document_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<i64>, PathRejection>,
    update: Result<Json<DocumentUpdate>, JsonRejection>,
) -> Result<Json<Document>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    let Json(update) = update.map_err(bad_request)?;
    let document = state
        .service
        .update_document(&user, id, update)
        .map_err(|e| e.context("Failed to update document"))?;
    Ok(Json(document))
}

/// Delete a document
pub async fn delete_document_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Json<MessageResponse>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    state
        .service
        .delete_document(&user, id)
        .map_err(|e| e.context("Failed to delete document"))?;
    Ok(MessageResponse::new("Document deleted successfully"))
}
