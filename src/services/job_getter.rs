//! Candidate job selection.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::AppResult;
use crate::models::{Job, JobGcsPrefix};

/// Read-only access to the job warehouse.
#[async_trait]
pub trait JobCatalog: Send + Sync {
    /// All known jobs, ordered by name.
    async fn list_all_jobs(&self) -> AppResult<Vec<Job>>;

    /// Id of the newest run of `job_name` started before `before`, if any.
    async fn latest_job_run_before(
        &self,
        job_name: &str,
        before: DateTime<Utc>,
    ) -> AppResult<Option<String>>;
}

/// Produces the jobs whose runs make up a payload.
#[async_trait]
pub trait JobGetter: Send + Sync {
    async fn get_jobs(&self) -> AppResult<Vec<Job>>;
}

/// Facet filters for release-controller payloads.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub platform: Option<String>,
    pub network: Option<String>,
    pub infrastructure: Option<String>,
    /// Jobs whose name contains any of these are left out
    pub exclude_job_names: Vec<String>,
}

impl JobFilter {
    pub fn matches(&self, job: &Job) -> bool {
        if self.platform.as_ref().is_some_and(|p| *p != job.platform)
            || self.network.as_ref().is_some_and(|n| *n != job.network)
            || self
                .infrastructure
                .as_deref()
                .is_some_and(|i| i != job.infrastructure())
        {
            return false;
        }

        !self
            .exclude_job_names
            .iter()
            .any(|excluded| job.name.contains(excluded.as_str()))
    }
}

/// Job getter over the warehouse catalog.
///
/// With explicit prefixes (pull-request payloads) exactly the named jobs
/// are kept; otherwise jobs are selected by the facet filter.
pub struct CatalogJobGetter {
    catalog: Arc<dyn JobCatalog>,
    filter: JobFilter,
    explicit_prefixes: Vec<JobGcsPrefix>,
}

impl CatalogJobGetter {
    pub fn new(
        catalog: Arc<dyn JobCatalog>,
        filter: JobFilter,
        explicit_prefixes: Vec<JobGcsPrefix>,
    ) -> Self {
        Self {
            catalog,
            filter,
            explicit_prefixes,
        }
    }
}

#[async_trait]
impl JobGetter for CatalogJobGetter {
    async fn get_jobs(&self) -> AppResult<Vec<Job>> {
        let jobs = self.catalog.list_all_jobs().await?;
        let total = jobs.len();

        let selected: Vec<Job> = if self.explicit_prefixes.is_empty() {
            jobs.into_iter().filter(|job| self.filter.matches(job)).collect()
        } else {
            let names: HashSet<&str> = self
                .explicit_prefixes
                .iter()
                .map(|p| p.job_name.as_str())
                .collect();
            jobs.into_iter()
                .filter(|job| names.contains(job.name.as_str()))
                .collect()
        };

        info!("Selected {} of {} jobs", selected.len(), total);
        Ok(selected)
    }
}
