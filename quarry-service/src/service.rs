//! Document service: the operations behind the HTTP API and the background
//! ingestion workers.
//!
//! Operations are split by concern into submodules, each adding methods to
//! [`DocumentService`]:
//! - authentication and user bootstrap
//! - document submission and upload staging
//! - document and search space CRUD
//! - the durable job queue and its workers

mod auth;
mod documents;
mod jobs;
mod search_spaces;
mod submission;
mod workers;

pub use auth::hash_token;
pub use documents::DocumentUpdate;
pub use submission::UploadedFile;
pub use workers::start_ingestion_workers;

use std::sync::Arc;

use tokio::sync::Notify;
use tracing::info;

use crate::config::ServiceConfig;
use crate::db::{Session, SessionProvider};
use crate::error::{ProcessingError, ServiceResult};
use crate::ingestion::{Chunker, Crawler, Ingestor, SourceIngestor};

/// Main service coordinator
pub struct DocumentService {
    config: Arc<ServiceConfig>,
    sessions: Arc<dyn SessionProvider>,
    ingestor: Arc<dyn Ingestor>,
    chunker: Chunker,
    /// Wakes idle workers when jobs are enqueued
    job_signal: Arc<Notify>,
}

impl DocumentService {
    /// Create a service with the production ingestor
    pub fn new(config: ServiceConfig, sessions: Arc<dyn SessionProvider>) -> ServiceResult<Self> {
        let chunker = Chunker::from_config(&config.ingestion);
        let ingestor = SourceIngestor::new(Crawler::new(&config.crawler)?, chunker);
        Self::with_ingestor(config, sessions, Arc::new(ingestor))
    }

    /// Create a service around any ingestor implementation
    pub fn with_ingestor(
        config: ServiceConfig,
        sessions: Arc<dyn SessionProvider>,
        ingestor: Arc<dyn Ingestor>,
    ) -> ServiceResult<Self> {
        let upload_dir = config.storage.upload_dir();
        std::fs::create_dir_all(&upload_dir).map_err(ProcessingError::Io)?;

        info!(
            upload_dir = %upload_dir.display(),
            workers = config.ingestion.workers,
            "Document service initialized"
        );

        Ok(Self {
            chunker: Chunker::from_config(&config.ingestion),
            config: Arc::new(config),
            sessions,
            ingestor,
            job_signal: Arc::new(Notify::new()),
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Open a fresh session for one unit of work
    pub(crate) fn open_session(&self) -> ServiceResult<Session> {
        self.sessions.open_session()
    }
}
