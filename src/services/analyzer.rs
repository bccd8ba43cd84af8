//! Cross-job test case analysis for one payload.
//!
//! Waits until the payload's job runs can be complete, collects them across
//! all candidate jobs, runs the test case checkers over their JUnit results
//! and writes one synthetic JUnit document.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{defaults, AnalyzerSettings};
use crate::error::{AppError, AppResult};
use crate::models::{ArtifactLinks, Job, JobGcsPrefix, JobRun, TestSuite};
use crate::services::fan_out::{collect_job_runs, FanOutSettings, JobLocatorTask};
use crate::services::job_getter::{JobCatalog, JobGetter};
use crate::services::job_run_locator::{
    PayloadJobRunLocator, RetrySettings, RunMatcher, SearchWindow,
};
use crate::services::run_resolver::read_combined_junit;
use crate::services::storage::ObjectStore;
use crate::services::threshold::{
    output_test_case_failures, test_name_suffix, JobRunJunit, MinimumRequiredPassesChecker,
    TestCaseChecker,
};
use crate::services::wait::{wait_and_get_all_finished_job_runs, wait_until_time, JobRunGetter};

/// Root suite of the synthetic result document.
pub const CROSS_JOBS_SUITE: &str = "payload-cross-jobs";

/// File name of the synthetic result document.
pub const ANALYSIS_FILE_NAME: &str = "junit-test-case-analysis.xml";

/// Which payload to analyze.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadSelector {
    /// Release-controller payload; runs live under `logs/<job>`
    Tag(String),
    /// Pull-request payload; runs live under the prefix paired with each job
    InvocationId {
        id: String,
        prefixes: Vec<JobGcsPrefix>,
    },
}

impl PayloadSelector {
    /// Payload tag or invocation id.
    pub fn match_id(&self) -> &str {
        match self {
            PayloadSelector::Tag(tag) => tag,
            PayloadSelector::InvocationId { id, .. } => id,
        }
    }

    pub fn matcher(&self) -> RunMatcher {
        match self {
            PayloadSelector::Tag(tag) => RunMatcher::payload_tag(tag.clone()),
            PayloadSelector::InvocationId { id, .. } => RunMatcher::invocation_id(id.clone()),
        }
    }

    /// Storage root of a job's runs. `None` for a pull-request job without a
    /// paired prefix.
    pub fn storage_root(&self, job_name: &str) -> Option<String> {
        match self {
            PayloadSelector::Tag(_) => Some(format!("logs/{}", job_name)),
            PayloadSelector::InvocationId { prefixes, .. } => prefixes
                .iter()
                .find(|p| p.job_name == job_name)
                .map(|p| p.gcs_prefix.clone()),
        }
    }
}

/// Fixed timing of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerTiming {
    /// Time after the start estimate before job run lists can be complete
    pub readiness_grace: TimeDelta,
    /// Kept free at the end of the timeout for checking and reporting
    pub safety_margin: Duration,
    /// Sleep between checks for unfinished runs
    pub poll_interval: Duration,
    pub search_window: SearchWindow,
}

impl Default for AnalyzerTiming {
    fn default() -> Self {
        Self {
            readiness_grace: TimeDelta::seconds(defaults::READINESS_GRACE_SECS as i64),
            safety_margin: Duration::from_secs(defaults::SAFETY_MARGIN_SECS),
            poll_interval: Duration::from_secs(defaults::FINISHED_POLL_INTERVAL_SECS),
            search_window: SearchWindow::default(),
        }
    }
}

/// Analysis inputs.
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    pub selector: PayloadSelector,
    /// Parent of the per-payload output directory
    pub working_dir: PathBuf,
    pub job_start_estimate: DateTime<Utc>,
    /// Overall deadline, counted from the start of [`TestCaseAnalyzer::run`]
    pub timeout: Duration,
    pub timing: AnalyzerTiming,
    pub fan_out: FanOutSettings,
}

/// Analyzer for one payload.
pub struct TestCaseAnalyzer {
    options: AnalyzerOptions,
    job_getter: Arc<dyn JobGetter>,
    catalog: Arc<dyn JobCatalog>,
    store: Arc<dyn ObjectStore>,
    links: ArtifactLinks,
    checkers: Vec<Box<dyn TestCaseChecker>>,
}

impl TestCaseAnalyzer {
    pub fn new(
        options: AnalyzerOptions,
        job_getter: Arc<dyn JobGetter>,
        catalog: Arc<dyn JobCatalog>,
        store: Arc<dyn ObjectStore>,
        links: ArtifactLinks,
        checkers: Vec<Box<dyn TestCaseChecker>>,
    ) -> Self {
        Self {
            options,
            job_getter,
            catalog,
            store,
            links,
            checkers,
        }
    }

    /// Build options from validated settings.
    pub fn options_from_settings(settings: &AnalyzerSettings) -> AppResult<AnalyzerOptions> {
        let selector = match (&settings.payload_tag, &settings.payload_invocation_id) {
            (Some(tag), None) => PayloadSelector::Tag(tag.clone()),
            (None, Some(id)) => PayloadSelector::InvocationId {
                id: id.clone(),
                prefixes: settings.explicit_gcs_prefixes.clone(),
            },
            _ => {
                return Err(AppError::InvalidInput(
                    "exactly one of payload tag and invocation id must be set".to_string(),
                ));
            }
        };

        Ok(AnalyzerOptions {
            selector,
            working_dir: settings.working_dir.clone(),
            job_start_estimate: settings.job_start_time,
            timeout: settings.timeout,
            timing: AnalyzerTiming::default(),
            fan_out: FanOutSettings {
                max_concurrent_jobs: settings.max_concurrent_jobs,
                retry: RetrySettings::default(),
            },
        })
    }

    /// One minimum-passes checker per configured test.
    pub fn checkers_from_settings(settings: &AnalyzerSettings) -> Vec<Box<dyn TestCaseChecker>> {
        let suffix = test_name_suffix(
            settings.platform.as_deref().unwrap_or_default(),
            settings.network.as_deref().unwrap_or_default(),
            settings.infrastructure.as_deref().unwrap_or_default(),
        );

        settings
            .test_identifiers()
            .into_iter()
            .map(|test| {
                Box::new(MinimumRequiredPassesChecker {
                    test,
                    test_name_suffix: suffix.clone(),
                    required_passes: settings.minimum_successful_count as usize,
                }) as Box<dyn TestCaseChecker>
            })
            .collect()
    }

    /// Run the analysis and return the path of the written report.
    ///
    /// A gate that was not met is reported as [`AppError::TestCheckerFailed`]
    /// after the report was written. No payload runs at all is
    /// [`AppError::NoRelatedJobs`].
    pub async fn run(&self, cancel: &CancellationToken) -> AppResult<PathBuf> {
        let deadline = cancel.child_token();
        let _expire_deadline = deadline.clone().drop_guard();
        {
            let deadline = deadline.clone();
            let timeout = self.options.timeout;
            tokio::spawn(async move {
                tokio::select! {
                    _ = deadline.cancelled() => {}
                    _ = tokio::time::sleep(timeout) => {
                        warn!("Analysis timed out after {:?}", timeout);
                        deadline.cancel();
                    }
                }
            });
        }

        let match_id = self.options.selector.match_id();
        let output_dir = self.options.working_dir.join(match_id);
        tokio::fs::create_dir_all(&output_dir).await.map_err(|e| {
            AppError::FileSystem(format!(
                "Failed to create output directory {}: {}",
                output_dir.display(),
                e
            ))
        })?;

        let timing = &self.options.timing;
        let start = self.options.job_start_estimate;
        let ready_at = start + timing.readiness_grace;
        let wait_budget = TimeDelta::from_std(self.options.timeout.saturating_sub(timing.safety_margin))
            .map_err(|e| AppError::InvalidInput(format!("Invalid timeout: {}", e)))?;
        let time_to_stop_waiting = start + wait_budget;

        info!(
            "Analyzing test status for job runs of {}: now={}, ready at={}, stop waiting at={}",
            match_id,
            Utc::now(),
            ready_at,
            time_to_stop_waiting
        );

        wait_until_time(ready_at, &deadline).await?;
        let (finished, unfinished) = wait_and_get_all_finished_job_runs(
            self,
            time_to_stop_waiting,
            timing.poll_interval,
            JobRun::is_finished,
            &deadline,
        )
        .await?;

        let mut all_runs = finished;
        all_runs.extend(unfinished);
        let top = self.run_test_case_checkers(all_runs).await?;
        output_test_case_failures(&["root"], &top);

        let report_path = output_dir.join(ANALYSIS_FILE_NAME);
        tokio::fs::write(&report_path, top.to_xml()?)
            .await
            .map_err(|e| {
                AppError::FileSystem(format!(
                    "Failed to write {}: {}",
                    report_path.display(),
                    e
                ))
            })?;
        info!(
            "Wrote {} ({} tests, {} failed)",
            report_path.display(),
            top.num_tests,
            top.num_failed
        );

        if top.num_failed > 0 {
            return Err(AppError::TestCheckerFailed);
        }
        Ok(report_path)
    }

    /// Load JUnit results and run every checker under one root suite.
    ///
    /// Runs whose results cannot be loaded are left out.
    async fn run_test_case_checkers(&self, runs: Vec<JobRun>) -> AppResult<TestSuite> {
        let mut junits = Vec::with_capacity(runs.len());
        for run in runs {
            match read_combined_junit(&self.store, &run).await {
                Ok(suites) => junits.push(JobRunJunit {
                    job_run: run,
                    suites,
                }),
                Err(e) => warn!("Leaving {} out of analysis: {}", run, e),
            }
        }

        let mut top = TestSuite::new(CROSS_JOBS_SUITE);
        for checker in &self.checkers {
            top.children.push(checker.check_test_case(&junits)?);
        }
        top.update_test_counts();
        Ok(top)
    }

    fn locator_tasks(&self, jobs: Vec<Job>) -> Vec<JobLocatorTask> {
        let matcher = self.options.selector.matcher();
        jobs.into_iter()
            .filter_map(|job| {
                let Some(storage_root) = self.options.selector.storage_root(&job.name) else {
                    warn!("No storage prefix for job {}, skipping", job.name);
                    return None;
                };
                let locator = PayloadJobRunLocator {
                    job_name: job.name.clone(),
                    storage_root,
                    matcher: matcher.clone(),
                    start_estimate: self.options.job_start_estimate,
                    window: self.options.timing.search_window,
                    catalog: self.catalog.clone(),
                    store: self.store.clone(),
                    links: self.links.clone(),
                };
                Some(JobLocatorTask {
                    job_name: job.name,
                    locator: Arc::new(locator),
                })
            })
            .collect()
    }
}

#[async_trait]
impl JobRunGetter for TestCaseAnalyzer {
    async fn get_related_job_runs(&self, cancel: &CancellationToken) -> AppResult<Vec<JobRun>> {
        let jobs = self.job_getter.get_jobs().await?;
        info!("Searching job runs of {} jobs", jobs.len());
        collect_job_runs(self.locator_tasks(jobs), &self.options.fan_out, cancel).await
    }
}
