//! Concurrent job run collection across all payload jobs.

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::defaults;
use crate::error::{AppError, AppResult};
use crate::models::JobRun;
use crate::services::job_run_locator::{find_job_runs_with_retry, JobRunLocator, RetrySettings};

/// One job to search.
#[derive(Clone)]
pub struct JobLocatorTask {
    pub job_name: String,
    pub locator: Arc<dyn JobRunLocator>,
}

/// Fan-out limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutSettings {
    /// Jobs searched at the same time
    pub max_concurrent_jobs: usize,
    pub retry: RetrySettings,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: defaults::MAX_CONCURRENT_JOBS,
            retry: RetrySettings::default(),
        }
    }
}

/// Search every job concurrently and join all searches.
///
/// A job whose search fails contributes no runs and does not fail the
/// collection. Two things do: a fatal error (a malformed run id) from any
/// job, and `cancel` having fired by the time all searches joined.
pub async fn collect_job_runs(
    tasks: Vec<JobLocatorTask>,
    settings: &FanOutSettings,
    cancel: &CancellationToken,
) -> AppResult<Vec<JobRun>> {
    let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1)));
    // One result per task, so sends never wait for the join below
    let (result_tx, mut result_rx) = mpsc::channel(tasks.len().max(1));
    let mut workers = JoinSet::new();

    for task in tasks {
        let semaphore = semaphore.clone();
        let result_tx = result_tx.clone();
        let retry = settings.retry;
        let cancel = cancel.clone();

        workers.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return;
            };
            info!("Launching job run search for {}", task.job_name);
            let result =
                find_job_runs_with_retry(task.locator.as_ref(), &task.job_name, &retry, &cancel)
                    .await;
            let _ = result_tx.send((task.job_name, result)).await;
        });
    }
    drop(result_tx);

    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            warn!("Job run search task failed: {}", e);
        }
    }

    let mut runs = Vec::new();
    let mut fatal = None;
    while let Some((job_name, result)) = result_rx.recv().await {
        match result {
            Ok(job_runs) => {
                info!("Collected {} job runs for {}", job_runs.len(), job_name);
                runs.extend(job_runs);
            }
            Err(e) if e.is_fatal() => {
                error!("Job run search for {} hit a fatal error: {}", job_name, e);
                fatal.get_or_insert(e);
            }
            Err(e) => {
                warn!("Dropping job {} from analysis: {}", job_name, e);
            }
        }
    }

    if cancel.is_cancelled() {
        return Err(AppError::Cancelled(
            "job run collection cancelled".to_string(),
        ));
    }
    if let Some(e) = fatal {
        return Err(e);
    }

    Ok(runs)
}
