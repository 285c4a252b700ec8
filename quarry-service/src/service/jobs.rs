//! Running ingestion jobs and reporting on them.

use std::collections::HashSet;
use std::ffi::OsString;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::db::{IngestionJob, JobFilter, JobStatus, User};
use crate::error::{ProcessingError, ServiceError, ServiceResult, format_error_chain};
use crate::ingestion::IngestOutcome;
use crate::service::DocumentService;
use crate::service::submission::remove_staged_file;

/// Outcome of one processed job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job_id: String,
    /// `Pending` when the job was scheduled for another attempt
    pub status: JobStatus,
    pub document_id: Option<i64>,
    pub error: Option<String>,
}

impl DocumentService {
    /// Claim and run the next due job, if any.
    ///
    /// Ingestion failures are recorded on the job, not returned; an `Err` means
    /// the queue itself could not be read or updated. A job whose outcome could
    /// not be recorded stays `running` until its lease expires, then any worker
    /// may claim it again.
    pub async fn process_next_job(&self) -> ServiceResult<Option<JobReport>> {
        let lease_ms = i64::try_from(self.config.ingestion.job_lease_ms).unwrap_or(i64::MAX);
        let claimed = self
            .open_session()?
            .claim_next_job(Utc::now().timestamp_millis(), lease_ms)?;
        let Some(job) = claimed else {
            return Ok(None);
        };

        info!(
            job_id = %job.id,
            search_space_id = job.search_space_id,
            source = %job.source.label(),
            document_type = %job.source.document_type(),
            attempt = job.attempts,
            "Processing ingestion job"
        );

        let max_attempts = self.config.ingestion.max_attempts;
        let outcome = if job.attempts > max_attempts {
            // Reclaimed after its lease ran out with no attempts left
            Err(None)
        } else {
            match self.open_session() {
                Ok(session) => self
                    .ingestor
                    .ingest(session, job.search_space_id, &job.source)
                    .await
                    .map_err(Some),
                Err(e) => Err(Some(e)),
            }
        };

        let report = self.record_outcome(&job, outcome).inspect_err(|e| {
            error!(
                job_id = %job.id,
                attempt = job.attempts,
                error = %format_error_chain(e),
                "Failed to record job outcome, job will be reclaimed when its lease expires"
            );
        })?;

        if report.status.is_terminal()
            && let Some(path) = job.source.staged_path()
        {
            remove_staged_file(path);
        }

        Ok(Some(report))
    }

    /// Store the result of one attempt. `Err(None)` abandons the job.
    fn record_outcome(
        &self,
        job: &IngestionJob,
        outcome: Result<IngestOutcome, Option<ServiceError>>,
    ) -> ServiceResult<JobReport> {
        let session = self.open_session()?;
        let max_attempts = self.config.ingestion.max_attempts;

        let e = match outcome {
            Ok(outcome) => {
                session.complete_job(&job.id, outcome.document_id)?;
                metrics::counter!("quarry_jobs_completed_total").increment(1);
                if outcome.deduplicated {
                    metrics::counter!("quarry_documents_deduplicated_total").increment(1);
                } else {
                    metrics::counter!(
                        "quarry_documents_ingested_total",
                        "document_type" => outcome.document_type.as_str()
                    )
                    .increment(1);
                }
                info!(
                    job_id = %job.id,
                    document_id = outcome.document_id,
                    deduplicated = outcome.deduplicated,
                    "Ingestion job completed"
                );

                return Ok(JobReport {
                    job_id: job.id.clone(),
                    status: JobStatus::Completed,
                    document_id: Some(outcome.document_id),
                    error: None,
                });
            }
            Err(e) => e,
        };

        let message = match &e {
            Some(e) => format_error_chain(e),
            None => format!("Abandoned after {} attempts", max_attempts),
        };
        let retryable = e.as_ref().is_some_and(ServiceError::is_retryable);

        let status = if retryable && job.attempts < max_attempts {
            let backoff = self.config.ingestion.retry_backoff(job.attempts);
            let available_at = Utc::now().timestamp_millis() + backoff.as_millis() as i64;
            session.retry_job(&job.id, &message, available_at)?;
            metrics::counter!("quarry_jobs_retried_total").increment(1);
            warn!(
                job_id = %job.id,
                attempt = job.attempts,
                max_attempts,
                retry_in_ms = backoff.as_millis() as u64,
                error = %message,
                "Ingestion attempt failed, will retry"
            );
            JobStatus::Pending
        } else {
            session.fail_job(&job.id, &message)?;
            metrics::counter!("quarry_jobs_failed_total").increment(1);
            error!(
                job_id = %job.id,
                search_space_id = job.search_space_id,
                source = %job.source.label(),
                attempt = job.attempts,
                error = %message,
                "Ingestion job failed"
            );
            JobStatus::Failed
        };

        Ok(JobReport {
            job_id: job.id.clone(),
            status,
            document_id: None,
            error: Some(message),
        })
    }

    /// Return jobs interrupted by a previous shutdown or crash to the queue
    pub fn recover_interrupted_jobs(&self) -> ServiceResult<usize> {
        let recovered = self.open_session()?.reset_running_jobs()?;
        if recovered > 0 {
            info!(count = recovered, "Requeued interrupted ingestion jobs");
        }
        Ok(recovered)
    }

    /// Delete staged uploads that no unfinished job refers to
    pub fn sweep_orphaned_uploads(&self) -> ServiceResult<usize> {
        let active: HashSet<OsString> = self
            .open_session()?
            .active_staged_paths()?
            .into_iter()
            .filter_map(|p| p.file_name().map(|n| n.to_os_string()))
            .collect();

        let entries =
            std::fs::read_dir(self.config.storage.upload_dir()).map_err(ProcessingError::Io)?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(ProcessingError::Io)?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && !active.contains(&entry.file_name()) {
                remove_staged_file(&entry.path());
                removed += 1;
            }
        }

        if removed > 0 {
            info!(count = removed, "Removed orphaned uploads");
        } else {
            debug!("No orphaned uploads");
        }
        Ok(removed)
    }

    pub fn list_jobs(
        &self,
        user: &User,
        filter: JobFilter,
        skip: Option<u32>,
        limit: Option<u32>,
    ) -> ServiceResult<Vec<IngestionJob>> {
        let limit = self.config.limits.page_size(limit);
        self.open_session()?
            .list_owned_jobs(&user.id, filter, skip.unwrap_or(0), limit)
    }

    pub fn get_job(&self, user: &User, job_id: &str) -> ServiceResult<IngestionJob> {
        self.open_session()?.require_owned_job(job_id, &user.id)
    }

    /// Jobs waiting for a worker
    pub fn pending_job_count(&self) -> ServiceResult<usize> {
        self.open_session()?.count_jobs(JobStatus::Pending)
    }
}
