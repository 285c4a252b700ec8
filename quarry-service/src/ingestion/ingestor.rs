//! Source-specific ingestion routines behind one interface.

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::db::{DocumentType, NewDocument, Session};
use crate::error::{ProcessingError, ServiceError, ServiceResult};

use super::sources::IngestionSource;
use super::{Chunker, Crawler, compute_content_hash, parse_file, render_sections};

/// Result of ingesting one source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub document_id: i64,
    /// The content already existed in the search space
    pub deduplicated: bool,
    pub document_type: DocumentType,
}

/// Text and metadata extracted from a source, not yet persisted
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub title: String,
    pub document_type: DocumentType,
    pub metadata: serde_json::Value,
    pub content: String,
}

/// Turns one source into a persisted document.
///
/// Each call receives its own session, opened for this unit of work only.
#[async_trait]
pub trait Ingestor: Send + Sync {
    async fn ingest(
        &self,
        session: Session,
        search_space_id: i64,
        source: &IngestionSource,
    ) -> ServiceResult<IngestOutcome>;
}

/// The production ingestor: crawls URLs, parses staged files, renders captures
pub struct SourceIngestor {
    crawler: Crawler,
    chunker: Chunker,
}

impl SourceIngestor {
    pub fn new(crawler: Crawler, chunker: Chunker) -> Self {
        Self { crawler, chunker }
    }

    async fn extract(&self, source: &IngestionSource) -> ServiceResult<ExtractedDocument> {
        match source {
            IngestionSource::Extension { capture } => {
                let metadata = serde_json::to_value(&capture.metadata)
                    .map_err(crate::error::DatabaseError::Serialization)?;
                Ok(ExtractedDocument {
                    title: capture.metadata.title.clone(),
                    document_type: DocumentType::Extension,
                    metadata,
                    content: capture.to_markdown(),
                })
            }
            IngestionSource::CrawledUrl { url } => {
                let page = self.crawler.fetch(url).await?;
                Ok(ExtractedDocument {
                    title: page.title.clone().unwrap_or_else(|| url.clone()),
                    document_type: DocumentType::CrawledUrl,
                    metadata: json!({
                        "url": page.url,
                        "status": page.status,
                        "content_type": page.content_type,
                    }),
                    content: page.text,
                })
            }
            IngestionSource::File {
                staged_path,
                filename,
            } => {
                let path = staged_path.clone();
                let sections = tokio::task::spawn_blocking(move || parse_file(&path))
                    .await
                    .map_err(|e| ServiceError::Internal {
                        message: format!("File parsing task failed: {}", e),
                    })??;

                Ok(ExtractedDocument {
                    title: filename.clone(),
                    document_type: DocumentType::File,
                    metadata: json!({
                        "filename": filename,
                        "sections": sections.len(),
                    }),
                    content: render_sections(&sections),
                })
            }
            IngestionSource::YoutubeVideo { .. } => {
                Err(ServiceError::Processing(ProcessingError::UnsupportedSource {
                    message: "YouTube video ingestion is not supported".to_string(),
                }))
            }
        }
    }
}

#[async_trait]
impl Ingestor for SourceIngestor {
    async fn ingest(
        &self,
        session: Session,
        search_space_id: i64,
        source: &IngestionSource,
    ) -> ServiceResult<IngestOutcome> {
        let extracted = self.extract(source).await?;
        if extracted.content.trim().is_empty() {
            return Err(ProcessingError::EmptyContent {
                source_label: source.label().to_string(),
            }
            .into());
        }
        persist_document(&session, search_space_id, extracted, &self.chunker)
    }
}

/// Store extracted content as a document with its chunks.
///
/// Content already present in the search space resolves to the existing
/// document instead of creating a duplicate.
pub fn persist_document(
    session: &Session,
    search_space_id: i64,
    extracted: ExtractedDocument,
    chunker: &Chunker,
) -> ServiceResult<IngestOutcome> {
    let content_hash = compute_content_hash(extracted.content.as_bytes());
    let document_type = extracted.document_type;

    session.in_transaction(|tx| {
        if !tx.search_space_exists(search_space_id)? {
            return Err(ServiceError::SearchSpaceNotFound { search_space_id });
        }

        if let Some(document_id) = tx.find_document_by_hash(search_space_id, &content_hash)? {
            debug!(document_id, search_space_id, "Content already ingested");
            return Ok(IngestOutcome {
                document_id,
                deduplicated: true,
                document_type,
            });
        }

        let chunks = chunker.chunk(&extracted.content);
        let document_id = tx.insert_document(&NewDocument {
            search_space_id,
            title: extracted.title,
            document_type,
            document_metadata: extracted.metadata,
            content: extracted.content,
            content_hash,
        })?;
        tx.insert_chunks(document_id, &chunks)?;

        info!(
            document_id,
            search_space_id,
            document_type = %document_type,
            chunks = chunks.len(),
            "Document ingested"
        );

        Ok(IngestOutcome {
            document_id,
            deduplicated: false,
            document_type,
        })
    })
}
