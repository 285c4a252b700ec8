//! Service configuration.
//!
//! Settings are read once at startup from an optional `config.toml` and
//! `QUARRY__*` environment variables (see [`loader`]). Every field has a
//! default so the service starts with no configuration at all.

mod loader;

pub use loader::load_config;

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};

/// Top-level service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_ingestion")]
    pub ingestion: IngestionConfig,

    #[serde(default = "default_crawler")]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds the SQLite database and the upload staging directory.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("quarry.db")
    }

    /// Directory where uploaded files wait for their ingestion job.
    pub fn upload_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }
}

/// Request size and pagination limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_bytes: u64,

    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,
}

impl LimitsConfig {
    /// Resolve a requested page size against the configured default and cap.
    pub fn page_size(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_size)
            .min(self.max_page_size)
    }
}

/// Background ingestion worker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Number of concurrent ingestion workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// How often idle workers check for new jobs, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts (including the first) before a job is marked failed
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before a retried job becomes claimable again, multiplied by the attempt count
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// How long a claimed job may run before another worker may reclaim it
    #[serde(default = "default_job_lease_ms")]
    pub job_lease_ms: u64,

    /// Chunk size in words
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Words shared between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl IngestionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retry_backoff(&self, attempts: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(attempts as u64))
    }
}

/// Web crawler configuration for `CRAWLED_URL` documents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    #[serde(default = "default_crawler_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

/// Users whose API tokens are registered at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<BootstrapUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapUser {
    pub email: String,
    pub token: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            limits: default_limits(),
            ingestion: default_ingestion(),
            crawler: default_crawler(),
            auth: AuthConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Reject settings that would make the service misbehave at runtime.
    pub fn validate(&self) -> ServiceResult<()> {
        if self.ingestion.workers == 0 {
            return Err(ServiceError::Config {
                message: "ingestion.workers must be at least 1".to_string(),
            });
        }
        if self.ingestion.max_attempts == 0 {
            return Err(ServiceError::Config {
                message: "ingestion.max_attempts must be at least 1".to_string(),
            });
        }
        if self.ingestion.chunk_size == 0
            || self.ingestion.chunk_overlap >= self.ingestion.chunk_size
        {
            return Err(ServiceError::Config {
                message: format!(
                    "ingestion.chunk_overlap ({}) must be smaller than a non-zero ingestion.chunk_size ({})",
                    self.ingestion.chunk_overlap, self.ingestion.chunk_size
                ),
            });
        }
        if self.limits.max_page_size == 0 {
            return Err(ServiceError::Config {
                message: "limits.max_page_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        data_dir: default_data_dir(),
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_size_bytes: default_max_upload_size(),
        default_page_size: default_page_size(),
        max_page_size: default_max_page_size(),
    }
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024
}

fn default_page_size() -> u32 {
    300
}

fn default_max_page_size() -> u32 {
    1000
}

fn default_ingestion() -> IngestionConfig {
    IngestionConfig {
        workers: default_workers(),
        poll_interval_ms: default_poll_interval_ms(),
        max_attempts: default_max_attempts(),
        retry_backoff_ms: default_retry_backoff_ms(),
        job_lease_ms: default_job_lease_ms(),
        chunk_size: default_chunk_size(),
        chunk_overlap: default_chunk_overlap(),
    }
}

fn default_workers() -> usize {
    2
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    5000
}

fn default_job_lease_ms() -> u64 {
    10 * 60 * 1000
}

fn default_chunk_size() -> usize {
    512
}

fn default_chunk_overlap() -> usize {
    64
}

fn default_crawler() -> CrawlerConfig {
    CrawlerConfig {
        timeout_secs: default_crawler_timeout_secs(),
        user_agent: default_user_agent(),
        max_body_bytes: default_max_body_bytes(),
    }
}

fn default_crawler_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("quarry/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_body_bytes() -> u64 {
    10 * 1024 * 1024
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServiceConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.default_page_size, 300);
    }

    #[test]
    fn test_page_size_is_capped() {
        let limits = default_limits();
        assert_eq!(limits.page_size(None), 300);
        assert_eq!(limits.page_size(Some(2)), 2);
        assert_eq!(limits.page_size(Some(50_000)), 1000);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_chunk() {
        let mut config = ServiceConfig::default();
        config.ingestion.chunk_size = 10;
        config.ingestion.chunk_overlap = 10;
        assert!(matches!(
            config.validate(),
            Err(ServiceError::Config { .. })
        ));
    }

    #[test]
    fn test_retry_backoff_scales_with_attempts() {
        let ingestion = default_ingestion();
        assert_eq!(ingestion.retry_backoff(2), Duration::from_millis(10_000));
    }
}
