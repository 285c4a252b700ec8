//! Scheduling ingestion work: structured submissions and file uploads.
//!
//! Jobs are written in the request's transaction, so a request either schedules
//! all of its items or none of them.

use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use tracing::{debug, info};

use crate::db::{DocumentType, User};
use crate::error::{ServiceError, ServiceResult, format_error_chain};
use crate::ingestion::{IngestionSource, invalid_document_type};
use crate::service::DocumentService;

/// Longest file extension carried over to a staged upload.
const MAX_STAGED_EXTENSION_LEN: usize = 16;

/// A fully buffered file from a multipart upload
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub data: Bytes,
}

impl DocumentService {
    /// Schedule one ingestion job per content item, returning the job ids.
    ///
    /// Ownership is checked before the document type is looked at, so an
    /// unowned search space is always a 404.
    pub fn submit_documents(
        &self,
        user: &User,
        search_space_id: i64,
        document_type: &str,
        content: Vec<serde_json::Value>,
    ) -> ServiceResult<Vec<String>> {
        let session = self.open_session()?;

        let job_ids = session.in_transaction(|tx| {
            tx.require_owned_search_space(search_space_id, &user.id)?;

            let document_type = document_type
                .parse::<DocumentType>()
                .map_err(|_| invalid_document_type())?;

            let sources = content
                .into_iter()
                .map(|item| IngestionSource::from_submission(document_type, item))
                .collect::<ServiceResult<Vec<_>>>()?;

            sources
                .iter()
                .map(|source| tx.insert_job(search_space_id, source))
                .collect::<ServiceResult<Vec<_>>>()
        })?;

        info!(
            user_id = %user.id,
            search_space_id,
            document_type,
            jobs = job_ids.len(),
            "Documents scheduled for ingestion"
        );
        self.jobs_enqueued(job_ids.len());

        Ok(job_ids)
    }

    /// Stage uploaded files on disk and schedule one job per file.
    ///
    /// If any file fails to stage, jobs for earlier files are rolled back and
    /// their staged copies removed.
    pub fn stage_uploads(
        &self,
        user: &User,
        search_space_id: i64,
        files: Vec<UploadedFile>,
    ) -> ServiceResult<Vec<String>> {
        let session = self.open_session()?;
        session.require_owned_search_space(search_space_id, &user.id)?;

        if files.is_empty() {
            return Err(ServiceError::InvalidRequest {
                message: "No files provided".to_string(),
            });
        }

        let mut staged: Vec<PathBuf> = Vec::new();
        let result = session.in_transaction(|tx| {
            let mut job_ids = Vec::with_capacity(files.len());
            for file in &files {
                let staging_failed = |message: String| ServiceError::Staging {
                    filename: file.filename.clone(),
                    message,
                };

                let path = self
                    .stage_file(file)
                    .map_err(|e| staging_failed(e.to_string()))?;
                staged.push(path.clone());

                let source = IngestionSource::File {
                    staged_path: path,
                    filename: file.filename.clone(),
                };
                let job_id = tx
                    .insert_job(search_space_id, &source)
                    .map_err(|e| staging_failed(format_error_chain(&e)))?;
                job_ids.push(job_id);
            }
            Ok(job_ids)
        });

        match result {
            Ok(job_ids) => {
                info!(
                    user_id = %user.id,
                    search_space_id,
                    files = job_ids.len(),
                    "Files staged for ingestion"
                );
                self.jobs_enqueued(job_ids.len());
                Ok(job_ids)
            }
            Err(e) => {
                for path in &staged {
                    remove_staged_file(path);
                }
                Err(e)
            }
        }
    }

    /// Write one upload to a uniquely named file in the upload directory
    fn stage_file(&self, file: &UploadedFile) -> std::io::Result<PathBuf> {
        let mut staged = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&staged_suffix(&file.filename))
            .tempfile_in(self.config.storage.upload_dir())?;
        staged.write_all(&file.data)?;
        staged.flush()?;

        let (_, path) = staged.keep().map_err(|e| e.error)?;
        debug!(filename = %file.filename, path = %path.display(), bytes = file.data.len(), "Upload staged");
        Ok(path)
    }

    fn jobs_enqueued(&self, count: usize) {
        metrics::counter!("quarry_jobs_enqueued_total").increment(count as u64);
        for _ in 0..count {
            self.job_signal.notify_one();
        }
    }
}

/// Extension of the original filename, reduced to a safe `.ext` suffix.
fn staged_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            e.chars()
                .filter(char::is_ascii_alphanumeric)
                .take(MAX_STAGED_EXTENSION_LEN)
                .collect::<String>()
                .to_ascii_lowercase()
        })
        .filter(|e| !e.is_empty())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// Remove a staged upload; a file that is already gone is not an error.
pub(crate) fn remove_staged_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed staged upload"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!(path = %path.display(), error = %e, "Failed to remove staged upload"),
    }
}
