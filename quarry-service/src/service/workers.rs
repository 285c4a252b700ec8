//! Background ingestion workers.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::service::DocumentService;

/// Pause after the queue itself fails before polling again
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Start the configured number of ingestion workers.
///
/// Each worker drains the queue, then sleeps until a job is enqueued, the poll
/// interval passes, or `shutdown` is cancelled. A job in progress is finished
/// before the worker exits.
pub fn start_ingestion_workers(
    service: Arc<DocumentService>,
    shutdown: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let count = service.config.ingestion.workers.max(1);
    (0..count)
        .map(|worker| {
            let service = service.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { run_worker(worker, service, shutdown).await })
        })
        .collect()
}

async fn run_worker(worker: usize, service: Arc<DocumentService>, shutdown: CancellationToken) {
    info!(worker, "Ingestion worker started");
    let poll_interval = service.config.ingestion.poll_interval();

    while !shutdown.is_cancelled() {
        match service.process_next_job().await {
            Ok(Some(report)) => {
                debug!(worker, job_id = %report.job_id, status = %report.status.as_str(), "Job processed");
            }
            Ok(None) => {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = service.job_signal.notified() => {}
                    _ = tokio::time::sleep(poll_interval) => {}
                }
            }
            Err(e) => {
                error!(worker, error = %crate::error::format_error_chain(&e), "Failed to process ingestion queue");
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(ERROR_BACKOFF) => {}
                }
            }
        }
    }

    info!(worker, "Ingestion worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::JobStatus;
    use crate::service::test_support::TestService;
    use serde_json::json;

    #[tokio::test]
    async fn test_workers_drain_queue_and_stop() {
        let test = TestService::with_config(|config| {
            config.ingestion.workers = 2;
            config.ingestion.poll_interval_ms = 20;
        });
        let user = test.user("a@example.com");
        let space = test.search_space(&user);

        let shutdown = CancellationToken::new();
        let handles = start_ingestion_workers(test.service.clone(), shutdown.clone());
        assert_eq!(handles.len(), 2);

        let capture = json!({
            "metadata": {
                "BrowsingSessionId": "s1",
                "VisitedWebPageURL": "https://example.com/a",
                "VisitedWebPageTitle": "Captured",
                "VisitedWebPageDateWithTimeInISOString": "2024-01-01T00:00:00Z"
            },
            "pageContent": "captured page body"
        });
        let job_ids = test
            .service
            .submit_documents(&user, space, "EXTENSION", vec![capture])
            .unwrap();

        let mut status = JobStatus::Pending;
        for _ in 0..200 {
            status = test.service.get_job(&user, &job_ids[0]).unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, JobStatus::Completed);

        shutdown.cancel();
        for result in futures::future::join_all(handles).await {
            result.unwrap();
        }
    }
}
