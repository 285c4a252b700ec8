use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Not authenticated")]
    Unauthorized,

    #[error(
        "Search space {search_space_id} not found or you don't have permission to access it"
    )]
    SearchSpaceNotFound { search_space_id: i64 },

    #[error("Document with id {document_id} not found")]
    DocumentNotFound { document_id: i64 },

    #[error("Ingestion job {job_id} not found")]
    JobNotFound { job_id: String },

    #[error("{message}")]
    InvalidRequest { message: String },

    #[error("Failed to process file {filename}: {message}")]
    Staging { filename: String, message: String },

    #[error("{message}")]
    PayloadTooLarge { message: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Document processing failed")]
    Processing(#[from] ProcessingError),

    #[error("Crawl failed")]
    Crawl(#[from] CrawlError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("{message}")]
    Internal { message: String },
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed")]
    Serialization(#[source] serde_json::Error),
}

/// Document processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Failed to extract text from page {page}")]
    TextExtraction {
        page: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to read EPUB: {0}")]
    EpubRead(String),

    #[error("Unsupported file format: {format}")]
    UnsupportedFormat { format: String },

    #[error("{message}")]
    UnsupportedSource { message: String },

    #[error("No content could be extracted from {source_label}")]
    EmptyContent { source_label: String },

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// URL crawling errors
#[derive(Error, Debug)]
pub enum CrawlError {
    #[error("Invalid URL {url}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("{url} returned unsupported content type {content_type}")]
    UnsupportedContentType { url: String, content_type: String },

    #[error("{url} body exceeds {max} bytes")]
    BodyTooLarge { url: String, max: u64 },
}

/// API error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::SearchSpaceNotFound { .. }
            | ServiceError::DocumentNotFound { .. }
            | ServiceError::JobNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Staging { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ServiceError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::SearchSpaceNotFound { .. } => "search_space_not_found",
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::JobNotFound { .. } => "job_not_found",
            ServiceError::InvalidRequest { .. } => "invalid_request",
            ServiceError::Staging { .. } => "staging_failed",
            ServiceError::PayloadTooLarge { .. } => "payload_too_large",
            ServiceError::Conflict { .. } => "conflict",
            ServiceError::Database(_) => "database_error",
            ServiceError::Processing(ProcessingError::UnsupportedFormat { .. }) => {
                "unsupported_format"
            }
            ServiceError::Processing(_) => "processing_error",
            ServiceError::Crawl(_) => "crawl_error",
            ServiceError::Config { .. } => "config_error",
            ServiceError::Internal { .. } => "internal_error",
        }
    }

    /// Wrap a server-side failure with the operation that hit it.
    ///
    /// Client-facing errors (auth, not found, bad input) pass through unchanged so
    /// their status survives; anything that would be a 500 becomes an `Internal`
    /// error whose message carries the full source chain.
    pub fn context(self, operation: &str) -> ServiceError {
        if self.status_code().is_server_error() {
            ServiceError::Internal {
                message: format!("{}: {}", operation, format_error_chain(&self)),
            }
        } else {
            self
        }
    }

    /// Whether a background job that failed with this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ServiceError::Database(_) => true,
            ServiceError::Crawl(CrawlError::Request { .. }) => true,
            ServiceError::Crawl(CrawlError::Status { status, .. }) => {
                *status == 429 || *status >= 500
            }
            ServiceError::Processing(ProcessingError::Io(e)) => {
                e.kind() != std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Render an error and all of its sources as a single `a: b: c` line.
pub fn format_error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
