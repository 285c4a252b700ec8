//! Durable ingestion queue.
//!
//! Jobs move `pending -> running -> completed | failed`, with failed attempts
//! going back to `pending` until the attempt budget is spent. Claiming happens
//! inside an immediate transaction so two workers never run the same job.
//!
//! A claim holds a lease: `available_at` on a running job is the lease expiry.
//! A running job whose outcome was never recorded becomes claimable again once
//! its lease runs out.

use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{OptionalExtension, params};

use super::models::{IngestionJob, JobStatus};
use super::{Session, format_timestamp};
use crate::error::{DatabaseError, ServiceError, ServiceResult};
use crate::ingestion::IngestionSource;

const JOB_COLUMNS: &str = "j.id, j.search_space_id, j.source, j.status, j.attempts, j.error, \
     j.document_id, j.created_at, j.updated_at";

/// Optional filters for listing jobs
#[derive(Debug, Clone, Copy, Default)]
pub struct JobFilter {
    pub search_space_id: Option<i64>,
    pub status: Option<JobStatus>,
}

impl Session {
    /// Persist a pending job for one source item, returning the job id
    pub fn insert_job(&self, search_space_id: i64, source: &IngestionSource) -> ServiceResult<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let source_json = serde_json::to_string(source).map_err(DatabaseError::Serialization)?;
        let staged_path = source
            .staged_path()
            .map(|p| p.to_string_lossy().into_owned());
        let now = format_timestamp(Utc::now());

        self.conn
            .execute(
                r#"
                INSERT INTO ingestion_jobs (id, search_space_id, source, status, attempts, staged_path, available_at, created_at, updated_at)
                VALUES (?1, ?2, ?3, 'pending', 0, ?4, 0, ?5, ?5)
                "#,
                params![id, search_space_id, source_json, staged_path, now],
            )
            .map_err(DatabaseError::Query)?;

        Ok(id)
    }

    /// Claim the oldest due job, marking it running for `lease_ms`.
    ///
    /// Due means pending with `available_at <= now_ms`, or running with an
    /// expired lease. Times are unix millis.
    pub fn claim_next_job(
        &self,
        now_ms: i64,
        lease_ms: i64,
    ) -> ServiceResult<Option<IngestionJob>> {
        self.in_transaction(|tx| {
            let next: Option<String> = tx
                .conn
                .query_row(
                    "SELECT id FROM ingestion_jobs \
                     WHERE status IN ('pending', 'running') AND available_at <= ?1 \
                     ORDER BY created_at, rowid LIMIT 1",
                    params![now_ms],
                    |row| row.get(0),
                )
                .optional()
                .map_err(DatabaseError::Query)?;

            let Some(job_id) = next else {
                return Ok(None);
            };

            tx.conn
                .execute(
                    "UPDATE ingestion_jobs SET status = 'running', attempts = attempts + 1, \
                     available_at = ?1, updated_at = ?2 WHERE id = ?3",
                    params![
                        now_ms.saturating_add(lease_ms),
                        format_timestamp(Utc::now()),
                        job_id
                    ],
                )
                .map_err(DatabaseError::Query)?;

            tx.get_job(&job_id)
        })
    }

    /// Get a job by ID without an ownership check (worker side)
    pub fn get_job(&self, job_id: &str) -> ServiceResult<Option<IngestionJob>> {
        self.conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM ingestion_jobs j WHERE j.id = ?1"),
                params![job_id],
                IngestionJob::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Mark a job completed with the document it produced (or resolved to)
    pub fn complete_job(&self, job_id: &str, document_id: i64) -> ServiceResult<()> {
        self.conn
            .execute(
                "UPDATE ingestion_jobs SET status = 'completed', error = NULL, document_id = ?1, updated_at = ?2 \
                 WHERE id = ?3",
                params![document_id, format_timestamp(Utc::now()), job_id],
            )
            .map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Put a job back in the queue after a failed attempt
    pub fn retry_job(&self, job_id: &str, error: &str, available_at_ms: i64) -> ServiceResult<()> {
        self.conn
            .execute(
                "UPDATE ingestion_jobs SET status = 'pending', error = ?1, available_at = ?2, updated_at = ?3 \
                 WHERE id = ?4",
                params![error, available_at_ms, format_timestamp(Utc::now()), job_id],
            )
            .map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Mark a job permanently failed
    pub fn fail_job(&self, job_id: &str, error: &str) -> ServiceResult<()> {
        self.conn
            .execute(
                "UPDATE ingestion_jobs SET status = 'failed', error = ?1, updated_at = ?2 WHERE id = ?3",
                params![error, format_timestamp(Utc::now()), job_id],
            )
            .map_err(DatabaseError::Query)?;
        Ok(())
    }

    /// Return jobs left running by a previous process to the queue
    pub fn reset_running_jobs(&self) -> ServiceResult<usize> {
        self.conn
            .execute(
                "UPDATE ingestion_jobs SET status = 'pending', available_at = 0, updated_at = ?1 \
                 WHERE status = 'running'",
                params![format_timestamp(Utc::now())],
            )
            .map_err(DatabaseError::Query)
            .map_err(Into::into)
    }

    /// Staged files still needed by a pending or running job
    pub fn active_staged_paths(&self) -> ServiceResult<Vec<PathBuf>> {
        self.staged_paths_where("status IN ('pending', 'running')", params![])
    }

    /// Staged files of a search space's unfinished jobs, for cleanup before it is deleted
    pub fn staged_paths_for_search_space(&self, search_space_id: i64) -> ServiceResult<Vec<PathBuf>> {
        self.staged_paths_where(
            "status IN ('pending', 'running') AND search_space_id = ?1",
            params![search_space_id],
        )
    }

    fn staged_paths_where(
        &self,
        condition: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> ServiceResult<Vec<PathBuf>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT staged_path FROM ingestion_jobs WHERE staged_path IS NOT NULL AND {condition}"
            ))
            .map_err(DatabaseError::Query)?;

        let rows = stmt
            .query_map(params, |row| row.get::<_, String>(0))
            .map_err(DatabaseError::Query)?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(PathBuf::from(row.map_err(DatabaseError::Query)?));
        }
        Ok(paths)
    }

    /// Number of jobs in a given status
    pub fn count_jobs(&self, status: JobStatus) -> ServiceResult<usize> {
        let count: i64 = self
            .conn
            .query_row(
                "SELECT COUNT(*) FROM ingestion_jobs WHERE status = ?1",
                params![status.as_str()],
                |row| row.get(0),
            )
            .map_err(DatabaseError::Query)?;
        Ok(count as usize)
    }

    /// List a user's jobs, newest first
    pub fn list_owned_jobs(
        &self,
        user_id: &str,
        filter: JobFilter,
        skip: u32,
        limit: u32,
    ) -> ServiceResult<Vec<IngestionJob>> {
        let mut sql = format!(
            "SELECT {JOB_COLUMNS} FROM ingestion_jobs j \
             JOIN search_spaces s ON s.id = j.search_space_id \
             WHERE s.user_id = ?1"
        );

        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(user_id.to_string())];
        if let Some(space_id) = filter.search_space_id {
            params_vec.push(Box::new(space_id));
            sql.push_str(&format!(" AND j.search_space_id = ?{}", params_vec.len()));
        }
        if let Some(status) = filter.status {
            params_vec.push(Box::new(status.as_str()));
            sql.push_str(&format!(" AND j.status = ?{}", params_vec.len()));
        }
        sql.push_str(&format!(
            " ORDER BY j.created_at DESC, j.rowid DESC LIMIT ?{} OFFSET ?{}",
            params_vec.len() + 1,
            params_vec.len() + 2
        ));
        params_vec.push(Box::new(i64::from(limit)));
        params_vec.push(Box::new(i64::from(skip)));

        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params_vec.iter().map(|p| p.as_ref()).collect();

        let mut stmt = self.conn.prepare(&sql).map_err(DatabaseError::Query)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), IngestionJob::from_row)
            .map_err(DatabaseError::Query)?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row.map_err(DatabaseError::Query)?);
        }
        Ok(jobs)
    }

    /// Get a job if the user owns its search space
    pub fn require_owned_job(&self, job_id: &str, user_id: &str) -> ServiceResult<IngestionJob> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM ingestion_jobs j \
                     JOIN search_spaces s ON s.id = j.search_space_id \
                     WHERE j.id = ?1 AND s.user_id = ?2"
                ),
                params![job_id, user_id],
                IngestionJob::from_row,
            )
            .optional()
            .map_err(DatabaseError::Query)?
            .ok_or_else(|| ServiceError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }
}
