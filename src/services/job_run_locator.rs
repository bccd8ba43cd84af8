//! Finds the runs of one job that belong to a payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::defaults;
use crate::error::{AppError, AppResult};
use crate::models::{
    ArtifactLinks, JobRun, RunMetadata, PAYLOAD_INVOCATION_ID_LABEL, PAYLOAD_TAG_LABEL,
};
use crate::services::cursor_walker::{list_job_run_ids, AgeBands};
use crate::services::job_getter::JobCatalog;
use crate::services::run_resolver::read_job_run;
use crate::services::storage::ObjectStore;

/// One attempt at finding a job's payload runs.
///
/// An empty result means no payload run was found yet.
#[async_trait]
pub trait JobRunLocator: Send + Sync {
    async fn find_related_job_runs(&self, cancel: &CancellationToken) -> AppResult<Vec<JobRun>>;
}

/// Label selecting the runs of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunMatcher {
    pub label: &'static str,
    pub value: String,
}

impl RunMatcher {
    /// Release-controller payload, selected by tag.
    pub fn payload_tag(tag: impl Into<String>) -> Self {
        Self {
            label: PAYLOAD_TAG_LABEL,
            value: tag.into(),
        }
    }

    /// Pull-request payload, selected by invocation id.
    pub fn invocation_id(id: impl Into<String>) -> Self {
        Self {
            label: PAYLOAD_INVOCATION_ID_LABEL,
            value: id.into(),
        }
    }

    pub fn matches(&self, metadata: &RunMetadata) -> bool {
        metadata.label(self.label) == Some(self.value.as_str())
    }
}

/// Creation time window around the payload start estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchWindow {
    pub before: TimeDelta,
    pub after: TimeDelta,
}

impl Default for SearchWindow {
    fn default() -> Self {
        Self {
            before: TimeDelta::seconds(defaults::SEARCH_WINDOW_BEFORE_SECS),
            after: TimeDelta::seconds(defaults::SEARCH_WINDOW_AFTER_SECS),
        }
    }
}

/// Locator scanning one job's storage root for runs labelled with the payload.
pub struct PayloadJobRunLocator {
    pub job_name: String,
    /// `logs/<job>`, or the explicit prefix for pull-request payloads
    pub storage_root: String,
    pub matcher: RunMatcher,
    pub start_estimate: DateTime<Utc>,
    pub window: SearchWindow,
    pub catalog: Arc<dyn JobCatalog>,
    pub store: Arc<dyn ObjectStore>,
    pub links: ArtifactLinks,
}

#[async_trait]
impl JobRunLocator for PayloadJobRunLocator {
    async fn find_related_job_runs(&self, cancel: &CancellationToken) -> AppResult<Vec<JobRun>> {
        let window_start = self.start_estimate - self.window.before;
        let window_end = self.start_estimate + self.window.after;

        let starting_id = self
            .catalog
            .latest_job_run_before(&self.job_name, window_start)
            .await?;

        let now = Utc::now();
        // No too-young band: unfinished runs must still be found
        let bands = AgeBands {
            too_old: now - window_start,
            too_young: TimeDelta::zero(),
        };

        let walker_cancel = cancel.child_token();
        let _stop_walker = walker_cancel.clone().drop_guard();
        let mut stream = list_job_run_ids(
            self.store.clone(),
            self.storage_root.clone(),
            starting_id,
            bands,
            now,
            walker_cancel.clone(),
        );

        let mut runs = Vec::new();
        loop {
            let run_id = tokio::select! {
                _ = cancel.cancelled() => break,
                next = stream.ids.recv() => match next {
                    Some(run_id) => run_id,
                    None => break,
                },
            };

            let Some(run) = read_job_run(
                &self.store,
                &self.links,
                &self.storage_root,
                &self.job_name,
                &run_id,
            )
            .await?
            else {
                continue;
            };

            if run.metadata.metadata.creation_timestamp > window_end {
                info!(
                    "Job run {} was created after the search window, stopping",
                    run
                );
                break;
            }

            if self.matcher.matches(&run.metadata) {
                info!("Found job run {} for {}", run, self.matcher.value);
                runs.push(run);
            }
        }
        walker_cancel.cancel();

        if cancel.is_cancelled() {
            return Err(AppError::Cancelled(format!(
                "search for job {} cancelled",
                self.job_name
            )));
        }
        if let Ok(e) = stream.errors.try_recv() {
            return Err(e);
        }

        Ok(runs)
    }
}

/// Bounded retry policy for locator attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Consecutive failures tolerated before giving up
    pub max_consecutive_failures: u32,
    /// Sleep between attempts
    pub interval: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_consecutive_failures: defaults::MAX_CONSECUTIVE_FAILURES,
            interval: Duration::from_secs(defaults::LOCATOR_RETRY_INTERVAL_SECS),
        }
    }
}

/// Run locator attempts until one finds runs.
///
/// Every retryable error counts as a failure, and so does an attempt that
/// found no runs ([`AppError::NoJobRunsYet`]). The error of attempt
/// `max_consecutive_failures + 1` is returned. Fatal errors and cancellation
/// end the loop at once.
pub async fn find_job_runs_with_retry(
    locator: &dyn JobRunLocator,
    job_name: &str,
    retry: &RetrySettings,
    cancel: &CancellationToken,
) -> AppResult<Vec<JobRun>> {
    let mut failures = 0;
    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(format!("search for job {} cancelled", job_name)));
            }
            result = locator.find_related_job_runs(cancel) => result,
        };

        let err = match attempt {
            Ok(runs) if !runs.is_empty() => return Ok(runs),
            Ok(_) => AppError::NoJobRunsYet(job_name.to_string()),
            Err(e) if !e.is_retryable() => return Err(e),
            Err(e) => e,
        };

        failures += 1;
        if failures > retry.max_consecutive_failures {
            warn!(
                "Giving up finding job runs for {} after {} attempts: {}",
                job_name, failures, err
            );
            return Err(err);
        }
        warn!(
            "Error finding job runs for {} (attempt {}), retrying in {:?}: {}",
            job_name, failures, retry.interval, err
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(format!("search for job {} cancelled", job_name)));
            }
            _ = tokio::time::sleep(retry.interval) => {}
        }
    }
}
