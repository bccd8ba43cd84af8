//! Readiness and completion waits.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::JobRun;

/// Sleep until `ready_at`. Returns at once when that time has passed.
pub async fn wait_until_time(ready_at: DateTime<Utc>, cancel: &CancellationToken) -> AppResult<()> {
    let remaining = match (ready_at - Utc::now()).to_std() {
        Ok(remaining) if !remaining.is_zero() => remaining,
        _ => return Ok(()),
    };

    info!("Waiting until {} ({:?}) before looking for job runs", ready_at, remaining);
    tokio::select! {
        _ = cancel.cancelled() => Err(AppError::Cancelled(format!("wait until {} cancelled", ready_at))),
        _ = tokio::time::sleep(remaining) => Ok(()),
    }
}

/// Source of all job runs of the payload.
#[async_trait]
pub trait JobRunGetter: Send + Sync {
    async fn get_related_job_runs(&self, cancel: &CancellationToken) -> AppResult<Vec<JobRun>>;
}

/// Poll `getter` until every run is finished or `time_to_stop_waiting` has
/// passed, and return `(finished, unfinished)`.
///
/// No runs at all is reported as [`AppError::NoRelatedJobs`].
pub async fn wait_and_get_all_finished_job_runs<F>(
    getter: &dyn JobRunGetter,
    time_to_stop_waiting: DateTime<Utc>,
    poll_interval: Duration,
    is_finished: F,
    cancel: &CancellationToken,
) -> AppResult<(Vec<JobRun>, Vec<JobRun>)>
where
    F: Fn(&JobRun) -> bool,
{
    loop {
        let runs = getter.get_related_job_runs(cancel).await?;
        if runs.is_empty() {
            return Err(AppError::NoRelatedJobs);
        }

        let total = runs.len();
        let (finished, unfinished): (Vec<JobRun>, Vec<JobRun>) =
            runs.into_iter().partition(|run| is_finished(run));

        if unfinished.is_empty() {
            info!("All {} job runs are finished", total);
            return Ok((finished, unfinished));
        }

        if Utc::now() > time_to_stop_waiting {
            warn!(
                "Stopped waiting at {}: proceeding with {} unfinished of {} job runs",
                time_to_stop_waiting,
                unfinished.len(),
                total
            );
            return Ok((finished, unfinished));
        }

        info!(
            "{} of {} job runs are still running, checking again in {:?}",
            unfinished.len(),
            total,
            poll_interval
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled("waiting for job runs cancelled".to_string()));
            }
            _ = tokio::time::sleep(poll_interval) => {}
        }
    }
}
