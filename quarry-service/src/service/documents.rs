//! Document read, update and delete operations.

use serde::Deserialize;
use tracing::info;

use crate::db::{Document, DocumentChanges, DocumentType, User};
use crate::error::{ServiceError, ServiceResult};
use crate::ingestion::compute_content_hash;
use crate::service::DocumentService;

/// Partial document update; absent and `null` fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub document_type: Option<DocumentType>,
    #[serde(default)]
    pub document_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub search_space_id: Option<i64>,
}

impl DocumentService {
    /// List documents the user owns, ordered by id
    pub fn list_documents(
        &self,
        user: &User,
        search_space_id: Option<i64>,
        skip: Option<u32>,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<Document>> {
        let limit = self.config.limits.page_size(limit);
        self.open_session()?.list_owned_documents(
            &user.id,
            search_space_id,
            skip.unwrap_or(0),
            limit,
        )
    }

    /// Get a document by ID
    pub fn get_document(&self, user: &User, document_id: i64) -> ServiceResult<Document> {
        self.open_session()?
            .require_owned_document(document_id, &user.id)
    }

    /// Apply a partial update and return the updated document.
    ///
    /// New content is rehashed and rechunked. Moving a document requires owning
    /// the target search space, and neither a move nor a content change may
    /// produce a duplicate within the target space.
    pub fn update_document(
        &self,
        user: &User,
        document_id: i64,
        update: DocumentUpdate,
    ) -> ServiceResult<Document> {
        let session = self.open_session()?;

        let document = session.in_transaction(|tx| {
            let existing = tx.require_owned_document(document_id, &user.id)?;

            let target_space = update.search_space_id.unwrap_or(existing.search_space_id);
            let moved = target_space != existing.search_space_id;
            if moved {
                tx.require_owned_search_space(target_space, &user.id)?;
            }

            let mut changes = DocumentChanges {
                title: update.title,
                document_type: update.document_type,
                document_metadata: update.document_metadata,
                search_space_id: update.search_space_id,
                ..Default::default()
            };

            let new_content = update.content.filter(|c| *c != existing.content);
            let content_hash = match &new_content {
                Some(content) => compute_content_hash(content.as_bytes()),
                None => existing.content_hash.clone(),
            };

            if (moved || new_content.is_some())
                && tx
                    .find_document_by_hash(target_space, &content_hash)?
                    .is_some_and(|other| other != document_id)
            {
                return Err(ServiceError::Conflict {
                    message: format!(
                        "A document with identical content already exists in search space {}",
                        target_space
                    ),
                });
            }

            let chunks = new_content.as_deref().map(|c| self.chunker.chunk(c));
            if new_content.is_some() {
                changes.content_hash = Some(content_hash);
            }
            changes.content = new_content;

            tx.update_document(document_id, &changes)?;
            if let Some(chunks) = chunks {
                tx.delete_chunks_for_document(document_id)?;
                tx.insert_chunks(document_id, &chunks)?;
            }

            tx.require_owned_document(document_id, &user.id)
        })?;

        info!(document_id, user_id = %user.id, "Document updated");
        Ok(document)
    }

    /// Delete a document and its chunks
    pub fn delete_document(&self, user: &User, document_id: i64) -> ServiceResult<()> {
        if !self
            .open_session()?
            .delete_owned_document(document_id, &user.id)?
        {
            return Err(ServiceError::DocumentNotFound { document_id });
        }

        info!(document_id, user_id = %user.id, "Document deleted");
        Ok(())
    }
}
