//! HTTP API for the Quarry service.
//!
//! This module provides the REST API endpoints for:
//! - Health and metrics monitoring
//! - Document submission, upload and management
//! - Search space management
//! - Ingestion job status

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::ServiceError;
use crate::service::DocumentService;

pub mod auth;
pub mod documents;
pub mod jobs;
pub mod search_spaces;
use documents::{
    create_documents_handler, delete_document_handler, get_document_handler,
    list_documents_handler, update_document_handler, upload_files_handler,
};
use jobs::{get_job_handler, list_jobs_handler};
use search_spaces::{
    create_search_space_handler, delete_search_space_handler, get_search_space_handler,
    list_search_spaces_handler,
};

/// Application state
pub struct AppState {
    pub service: Arc<DocumentService>,
    pub start_time: Instant,
    /// Absent when no Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

/// Build the API router
pub fn router(service: Arc<DocumentService>, metrics: Option<PrometheusHandle>) -> Router {
    // Use the configured upload limit for multipart bodies
    let max_body_size = service.config().limits.max_upload_size_bytes as usize;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
        metrics,
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Document endpoints
        .route(
            "/documents",
            get(list_documents_handler).post(create_documents_handler),
        )
        .route(
            "/documents/",
            get(list_documents_handler).post(create_documents_handler),
        )
        .route(
            "/documents/fileupload",
            post(upload_files_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route(
            "/documents/{id}",
            get(get_document_handler)
                .put(update_document_handler)
                .delete(delete_document_handler),
        )
        // Search space endpoints
        .route(
            "/searchspaces",
            get(list_search_spaces_handler).post(create_search_space_handler),
        )
        .route(
            "/searchspaces/{id}",
            get(get_search_space_handler).delete(delete_search_space_handler),
        )
        // Job endpoints
        .route("/jobs", get(list_jobs_handler))
        .route("/jobs/{id}", get(get_job_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Turn an extractor rejection into a JSON error body
pub(crate) fn bad_request(rejection: impl std::fmt::Display) -> ServiceError {
    ServiceError::InvalidRequest {
        message: rejection.to_string(),
    }
}

/// Response carrying only a message
#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

// === Health & Metrics ===

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let pending_jobs = match state.service.pending_job_count() {
        Ok(count) => Some(count),
        Err(e) => {
            warn!(error = %crate::error::format_error_chain(&e), "Health check could not read the job queue");
            None
        }
    };

    Json(HealthResponse {
        status: if pending_jobs.is_some() {
            "healthy"
        } else {
            "degraded"
        },
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pending_jobs,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    uptime_seconds: u64,
    pending_jobs: Option<usize>,
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let body = state
        .metrics
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default();

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Method, Request};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::db::JobStatus;
    use crate::service::test_support::{FailingIngestor, TestService};

    const BOUNDARY: &str = "quarry-test-boundary";

    struct TestApp {
        test: TestService,
        app: Router,
    }

    impl TestApp {
        fn new(test: TestService) -> Self {
            let app = router(test.service.clone(), None);
            Self { test, app }
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
            (status, value)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: &str,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let builder = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {}", token));
            let request = match body {
                Some(body) => builder
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };
            self.send(request).await
        }

        async fn upload(
            &self,
            token: &str,
            search_space_id: i64,
            files: &[(&str, &[u8])],
        ) -> (StatusCode, Value) {
            let mut body = Vec::new();
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"search_space_id\"\r\n\r\n{search_space_id}\r\n"
                )
                .as_bytes(),
            );
            for (name, data) in files {
                body.extend_from_slice(
                    format!(
                        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
                body.extend_from_slice(b"\r\n");
            }
            body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

            let request = Request::builder()
                .method(Method::POST)
                .uri("/api/documents/fileupload")
                .header(header::AUTHORIZATION, format!("Bearer {}", token))
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from(body))
                .unwrap();
            self.send(request).await
        }

        /// Submit and process extension captures, returning the document ids
        async fn ingest_pages(&self, token: &str, space: i64, count: usize) -> Vec<i64> {
            let content: Vec<Value> = (0..count)
                .map(|i| {
                    json!({
                        "metadata": {
                            "BrowsingSessionId": "session",
                            "VisitedWebPageURL": format!("https://example.com/{i}"),
                            "VisitedWebPageTitle": format!("Page {i}"),
                            "VisitedWebPageDateWithTimeInISOString": "2024-05-01T10:00:00Z"
                        },
                        "pageContent": format!("Body of page {i}")
                    })
                })
                .collect();
            let (status, _) = self
                .call(
                    Method::POST,
                    "/api/documents",
                    token,
                    Some(json!({
                        "document_type": "EXTENSION",
                        "content": content,
                        "search_space_id": space
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::OK);

            let mut ids = Vec::new();
            while let Some(report) = self.test.service.process_next_job().await.unwrap() {
                ids.push(report.document_id.unwrap());
            }
            ids
        }
    }

    #[tokio::test]
    async fn test_health_and_metrics_are_public() {
        let app = TestApp::new(TestService::new());

        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["pending_jobs"], 0);

        let response = app
            .app
            .clone()
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_known_bearer_token() {
        let app = TestApp::new(TestService::new());

        let request = Request::builder()
            .uri("/api/documents")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "unauthorized");

        let (status, _) = app
            .call(Method::GET, "/api/documents", "nobody@example.com", None)
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_unsupported_document_type_persists_nothing() {
        let app = TestApp::new(TestService::new());
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/documents",
                "a@example.com",
                Some(json!({
                    "document_type": "FILE",
                    "content": ["x"],
                    "search_space_id": space
                })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid document type");
        assert_eq!(
            app.test.test_db.session().count_jobs(JobStatus::Pending).unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_submission_succeeds_even_when_ingestion_fails() {
        let app = TestApp::new(TestService::with_ingestor(FailingIngestor::new(404)));
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);

        let (status, body) = app
            .call(
                Method::POST,
                "/api/documents/",
                "a@example.com",
                Some(json!({
                    "document_type": "CRAWLED_URL",
                    "content": ["https://gone.example/page"],
                    "search_space_id": space
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Documents processed successfully");
        let job_id = body["job_ids"][0].as_str().unwrap().to_string();

        app.test.service.process_next_job().await.unwrap().unwrap();

        let (status, job) = app
            .call(
                Method::GET,
                &format!("/api/jobs/{job_id}"),
                "a@example.com",
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(job["status"], "failed");
        assert_eq!(job["document_type"], "CRAWLED_URL");
        assert!(job["error"].as_str().unwrap().contains("404"));

        let (_, jobs) = app
            .call(
                Method::GET,
                &format!("/api/jobs?search_space_id={space}&status=failed"),
                "a@example.com",
                None,
            )
            .await;
        assert_eq!(jobs.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cross_tenant_documents_are_invisible() {
        let app = TestApp::new(TestService::new());
        let owner = app.test.user("owner@example.com");
        app.test.user("intruder@example.com");
        let space = app.test.search_space(&owner);
        let ids = app.ingest_pages("owner@example.com", space, 1).await;
        let uri = format!("/api/documents/{}", ids[0]);

        for method in [Method::GET, Method::DELETE] {
            let (status, _) = app.call(method, &uri, "intruder@example.com", None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }
        let (status, _) = app
            .call(
                Method::PUT,
                &uri,
                "intruder@example.com",
                Some(json!({"title": "Mine now"})),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, list) = app
            .call(Method::GET, "/api/documents", "intruder@example.com", None)
            .await;
        assert!(list.as_array().unwrap().is_empty());

        let (status, doc) = app.call(Method::GET, &uri, "owner@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(doc["title"], "Page 0");
    }

    #[tokio::test]
    async fn test_documents_listed_with_trailing_slash() {
        let app = TestApp::new(TestService::new());
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);
        let ids = app.ingest_pages("a@example.com", space, 5).await;

        let (status, body) = app
            .call(Method::GET, "/api/documents/?skip=0&limit=2", "a@example.com", None)
            .await;
        assert_eq!(status, StatusCode::OK);
        let listed = body.as_array().unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|d| ids.contains(&d["id"].as_i64().unwrap())));
    }

    #[tokio::test]
    async fn test_pagination_returns_disjoint_pages() {
        let app = TestApp::new(TestService::new());
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);
        app.ingest_pages("a@example.com", space, 5).await;

        let page = |skip: u32| {
            let app = &app;
            async move {
                let (status, body) = app
                    .call(
                        Method::GET,
                        &format!("/api/documents?skip={skip}&limit=2&search_space_id={space}"),
                        "a@example.com",
                        None,
                    )
                    .await;
                assert_eq!(status, StatusCode::OK);
                body.as_array()
                    .unwrap()
                    .iter()
                    .map(|d| d["id"].as_i64().unwrap())
                    .collect::<Vec<_>>()
            }
        };

        let first = page(0).await;
        let second = page(2).await;
        assert_eq!(first.len(), 2);
        assert_eq!(second.len(), 2);
        assert!(first.iter().all(|id| !second.contains(id)));
    }

    #[tokio::test]
    async fn test_update_title_only_and_delete() {
        let app = TestApp::new(TestService::new());
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);
        let ids = app.ingest_pages("a@example.com", space, 1).await;
        let uri = format!("/api/documents/{}", ids[0]);

        let (_, before) = app.call(Method::GET, &uri, "a@example.com", None).await;
        let (status, after) = app
            .call(
                Method::PUT,
                &uri,
                "a@example.com",
                Some(json!({"title": "Renamed", "content": null})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(after["title"], "Renamed");
        assert_eq!(after["content"], before["content"]);

        let (status, body) = app.call(Method::DELETE, &uri, "a@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Document deleted successfully");

        let (status, body) = app
            .call(Method::DELETE, "/api/documents/999", "a@example.com", None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Document with id 999 not found");
        assert_eq!(body["code"], "document_not_found");
    }

    #[tokio::test]
    async fn test_malformed_json_gets_error_body() {
        let app = TestApp::new(TestService::new());
        app.test.user("a@example.com");

        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/documents")
            .header(header::AUTHORIZATION, "Bearer a@example.com")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "invalid_request");
    }

    #[tokio::test]
    async fn test_file_upload() {
        let app = TestApp::new(TestService::new());
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);

        let (status, body) = app.upload("a@example.com", space, &[]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No files provided");
        assert_eq!(app.test.upload_dir_entries(), 0);

        let (status, body) = app
            .upload(
                "a@example.com",
                space,
                &[
                    ("one.md", b"# One\n\nfirst".as_slice()),
                    ("two.txt", b"second".as_slice()),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Files uploaded for processing");
        assert_eq!(body["job_ids"].as_array().unwrap().len(), 2);
        assert_eq!(app.test.upload_dir_entries(), 2);

        app.test.user("b@example.com");
        let (status, _) = app.upload("b@example.com", space, &[("x.txt", b"x".as_slice())]).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(app.test.upload_dir_entries(), 2);
    }

    #[tokio::test]
    async fn test_file_upload_over_limit_is_rejected() {
        let app = TestApp::new(TestService::with_config(|config| {
            config.limits.max_upload_size_bytes = 256;
        }));
        let user = app.test.user("a@example.com");
        let space = app.test.search_space(&user);

        let big = vec![b'a'; 4096];
        let (status, body) = app.upload("a@example.com", space, &[("big.txt", big.as_slice())]).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["code"], "payload_too_large");
        assert_eq!(app.test.upload_dir_entries(), 0);
    }

    #[tokio::test]
    async fn test_search_space_lifecycle() {
        let app = TestApp::new(TestService::new());
        app.test.user("a@example.com");
        app.test.user("b@example.com");

        let (status, space) = app
            .call(
                Method::POST,
                "/api/searchspaces",
                "a@example.com",
                Some(json!({"name": "Research", "description": "papers"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let uri = format!("/api/searchspaces/{}", space["id"]);

        let (status, _) = app.call(Method::GET, &uri, "b@example.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, spaces) = app
            .call(Method::GET, "/api/searchspaces", "a@example.com", None)
            .await;
        assert_eq!(spaces.as_array().unwrap().len(), 1);

        let (status, _) = app.call(Method::DELETE, &uri, "a@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.call(Method::GET, &uri, "a@example.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
