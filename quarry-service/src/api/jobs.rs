//! Ingestion job status endpoints.
//!
//! Background failures never reach the request that scheduled the work; this
//! is where callers see them.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{PathRejection, QueryRejection},
    },
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::{DocumentType, IngestionJob, JobFilter, JobStatus};
use crate::error::ServiceError;

use super::auth::CurrentUser;
use super::{AppState, bad_request};

/// List jobs query parameters
#[derive(Deserialize)]
pub struct ListJobsParams {
    pub search_space_id: Option<i64>,
    pub status: Option<JobStatus>,
    pub skip: Option<u32>,
    pub limit: Option<u32>,
}

/// Client view of a job; staged file paths stay server-side
#[derive(Serialize)]
pub struct JobView {
    pub id: String,
    pub search_space_id: i64,
    pub document_type: DocumentType,
    /// URL or original filename
    pub source: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<IngestionJob> for JobView {
    fn from(job: IngestionJob) -> Self {
        Self {
            document_type: job.source.document_type(),
            source: job.source.label().to_string(),
            id: job.id,
            search_space_id: job.search_space_id,
            status: job.status,
            attempts: job.attempts,
            error: job.error,
            document_id: job.document_id,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

pub async fn list_jobs_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    params: Result<Query<ListJobsParams>, QueryRejection>,
) -> Result<Json<Vec<JobView>>, ServiceError> {
    let Query(params) = params.map_err(bad_request)?;
    let filter = JobFilter {
        search_space_id: params.search_space_id,
        status: params.status,
    };
    let jobs = state
        .service
        .list_jobs(&user, filter, params.skip, params.limit)
        .map_err(|e| e.context("Failed to fetch jobs"))?;
    Ok(Json(jobs.into_iter().map(JobView::from).collect()))
}

pub async fn get_job_handler(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<JobView>, ServiceError> {
    let Path(id) = id.map_err(bad_request)?;
    let job = state
        .service
        .get_job(&user, &id)
        .map_err(|e| e.context("Failed to fetch job"))?;
    Ok(Json(job.into()))
}
