//! Database model structs.
//!
//! This module contains the data structures for database records.

use chrono::{DateTime, Utc};
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use super::parse_timestamp;
use crate::ingestion::IngestionSource;

/// Where a document's content came from
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    IntoStaticStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    /// Page captured by the browser extension
    Extension,
    CrawledUrl,
    File,
    YoutubeVideo,
    SlackConnector,
    NotionConnector,
    GithubConnector,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }
}

/// Ingestion job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker
    Pending,
    /// Claimed by a worker
    Running,
    Completed,
    /// Gave up after the last attempt or a non-retryable error
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Authenticated API user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(2)?;

        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Search space record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSpace {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

impl SearchSpace {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let created_at_str: String = row.get(4)?;

        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            user_id: row.get(3)?,
            created_at: parse_timestamp(&created_at_str),
        })
    }
}

/// Document record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub document_type: DocumentType,
    pub document_metadata: serde_json::Value,
    pub content: String,
    #[serde(skip)]
    pub content_hash: String,
    pub created_at: DateTime<Utc>,
    pub search_space_id: i64,
}

impl Document {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let document_type_str: String = row.get(2)?;
        let metadata_str: String = row.get(3)?;
        let created_at_str: String = row.get(6)?;

        let document_type = document_type_str.parse::<DocumentType>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            document_type,
            document_metadata: serde_json::from_str(&metadata_str)
                .unwrap_or_else(|_| serde_json::json!({})),
            content: row.get(4)?,
            content_hash: row.get(5)?,
            created_at: parse_timestamp(&created_at_str),
            search_space_id: row.get(7)?,
        })
    }
}

/// Persisted unit of background ingestion work
#[derive(Debug, Clone)]
pub struct IngestionJob {
    pub id: String,
    pub search_space_id: i64,
    pub source: IngestionSource,
    pub status: JobStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub document_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl IngestionJob {
    pub(crate) fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let source_str: String = row.get(2)?;
        let status_str: String = row.get(3)?;
        let created_at_str: String = row.get(7)?;
        let updated_at_str: String = row.get(8)?;

        let source = serde_json::from_str(&source_str).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Self {
            id: row.get(0)?,
            search_space_id: row.get(1)?,
            source,
            status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
            attempts: row.get(4)?,
            error: row.get(5)?,
            document_id: row.get(6)?,
            created_at: parse_timestamp(&created_at_str),
            updated_at: parse_timestamp(&updated_at_str),
        })
    }
}
