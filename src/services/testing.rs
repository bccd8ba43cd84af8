//! In-memory collaborators for unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::models::{Job, JobRun, RunMetadata};
use crate::services::job_getter::JobCatalog;
use crate::services::job_run_locator::JobRunLocator;
use crate::services::storage::{ListQuery, ObjectPage, ObjectRecord, ObjectStore};

const PAGE_SIZE: usize = 2;

#[derive(Default)]
struct MemoryStoreState {
    objects: BTreeMap<String, (Vec<u8>, DateTime<Utc>)>,
    queries: Vec<ListQuery>,
    pages_served: usize,
    failing_lists: usize,
}

/// Paginated object store with inclusive start and exclusive end offsets.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryStoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, key: &str, data: &[u8], created_at: DateTime<Utc>) {
        self.state
            .lock()
            .unwrap()
            .objects
            .insert(key.to_string(), (data.to_vec(), created_at));
    }

    /// Make the next `n` listing calls fail.
    pub fn fail_next_lists(&self, n: usize) {
        self.state.lock().unwrap().failing_lists = n;
    }

    /// Listings started, i.e. first-page calls.
    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().queries.len()
    }

    /// Successful `list_page` calls, continuation pages included.
    pub fn pages_served(&self) -> usize {
        self.state.lock().unwrap().pages_served
    }

    /// Start offsets of all first-page listing calls, in call order.
    pub fn start_offsets(&self) -> Vec<Option<String>> {
        self.state
            .lock()
            .unwrap()
            .queries
            .iter()
            .map(|q| q.start_offset.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> AppResult<ObjectPage> {
        let mut state = self.state.lock().unwrap();
        if state.failing_lists > 0 {
            state.failing_lists -= 1;
            return Err(AppError::Storage("listing unavailable".to_string()));
        }
        state.pages_served += 1;
        if page_token.is_none() {
            state.queries.push(query.clone());
        }

        let mut matching = state
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(&query.prefix))
            .filter(|(key, _)| {
                query
                    .start_offset
                    .as_ref()
                    .is_none_or(|start| key.as_str() >= start.as_str())
            })
            .filter(|(key, _)| {
                query
                    .end_offset
                    .as_ref()
                    .is_none_or(|end| key.as_str() < end.as_str())
            })
            .filter(|(key, _)| {
                page_token
                    .as_ref()
                    .is_none_or(|token| key.as_str() > token.as_str())
            })
            .map(|(key, (_, created_at))| ObjectRecord {
                name: key.clone(),
                created_at: *created_at,
            });

        let objects: Vec<ObjectRecord> = matching.by_ref().take(PAGE_SIZE).collect();
        let next_page_token = if matching.next().is_some() {
            objects.last().map(|o| o.name.clone())
        } else {
            None
        };

        Ok(ObjectPage {
            objects,
            next_page_token,
        })
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| AppError::NotFound(format!("Object {}", key)))
    }
}

/// Run descriptor JSON.
pub fn prowjob_json(
    created_at: DateTime<Utc>,
    labels: &[(&str, &str)],
    completed_at: Option<DateTime<Utc>>,
) -> Vec<u8> {
    let labels: HashMap<&str, &str> = labels.iter().copied().collect();
    serde_json::json!({
        "kind": "ProwJob",
        "metadata": {
            "name": "run",
            "creationTimestamp": created_at,
            "labels": labels,
        },
        "spec": {"job": "job", "cluster": "build01"},
        "status": {
            "state": if completed_at.is_some() { "success" } else { "pending" },
            "startTime": created_at,
            "completionTime": completed_at,
        },
    })
    .to_string()
    .into_bytes()
}

/// A resolved job run with no result files.
pub fn job_run(job_name: &str, run_id: &str, finished: bool) -> JobRun {
    let created_at = Utc::now();
    let metadata = RunMetadata::from_bytes(&prowjob_json(
        created_at,
        &[],
        finished.then_some(created_at),
    ))
    .unwrap();

    JobRun {
        job_name: job_name.to_string(),
        run_id: run_id.to_string(),
        storage_root: format!("logs/{}", job_name),
        metadata_path: format!("logs/{}/{}/prowjob.json", job_name, run_id),
        junit_paths: Vec::new(),
        metadata,
        human_url: format!("https://prow.example.com/view/gs/bucket/logs/{}/{}", job_name, run_id),
        artifact_url: format!("https://gcsweb.example.com/gcs/bucket/logs/{}/{}/", job_name, run_id),
    }
}

/// Locator that replays scripted attempt results, then keeps failing.
#[derive(Default)]
pub struct ScriptedLocator {
    results: Mutex<VecDeque<AppResult<Vec<JobRun>>>>,
    attempts: AtomicUsize,
}

impl ScriptedLocator {
    pub fn new(results: Vec<AppResult<Vec<JobRun>>>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunLocator for ScriptedLocator {
    async fn find_related_job_runs(&self, _cancel: &CancellationToken) -> AppResult<Vec<JobRun>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AppError::Storage("listing unavailable".to_string())))
    }
}

/// Locator that never finishes on its own.
pub struct HangingLocator;

#[async_trait]
impl JobRunLocator for HangingLocator {
    async fn find_related_job_runs(&self, cancel: &CancellationToken) -> AppResult<Vec<JobRun>> {
        cancel.cancelled().await;
        Err(AppError::Cancelled("hanging locator".to_string()))
    }
}

/// Job catalog backed by a fixed job list and per-job seed run ids.
#[derive(Default)]
pub struct StaticCatalog {
    pub jobs: Vec<Job>,
    pub seeds: HashMap<String, String>,
}

#[async_trait]
impl JobCatalog for StaticCatalog {
    async fn list_all_jobs(&self) -> AppResult<Vec<Job>> {
        Ok(self.jobs.clone())
    }

    async fn latest_job_run_before(
        &self,
        job_name: &str,
        _before: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        Ok(self.seeds.get(job_name).cloned())
    }
}
