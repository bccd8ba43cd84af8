//! Shared fakes and fixtures for analyzer E2E tests.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use jobrun_analyzer_lib::error::{AppError, AppResult};
use jobrun_analyzer_lib::models::{ArtifactLinks, Job, TestSuite, TestSuites, PAYLOAD_TAG_LABEL};
use jobrun_analyzer_lib::services::analyzer::ANALYSIS_FILE_NAME;
use jobrun_analyzer_lib::services::{
    AnalyzerOptions, AnalyzerTiming, CatalogJobGetter, FanOutSettings, JobCatalog, JobFilter,
    ListQuery, MinimumRequiredPassesChecker, ObjectPage, ObjectRecord, ObjectStore,
    PayloadSelector, RetrySettings, SearchWindow, TestCaseAnalyzer, TestCaseChecker,
};

pub const TAG: &str = "4.11.0-0.nightly-2022-04-28-102605";

const PAGE_SIZE: usize = 3;

/// Artifact store kept in a sorted map.
#[derive(Clone, Default)]
pub struct FakeStore {
    objects: Arc<Mutex<BTreeMap<String, (Vec<u8>, DateTime<Utc>)>>>,
}

impl FakeStore {
    pub fn put(&self, key: &str, data: &[u8], created_at: DateTime<Utc>) {
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data.to_vec(), created_at));
    }
}

#[async_trait]
impl ObjectStore for FakeStore {
    async fn list_page(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> AppResult<ObjectPage> {
        let objects = self.objects.lock().unwrap();
        let mut matching = objects
            .range(query.prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&query.prefix))
            .filter(|(key, _)| {
                query
                    .start_offset
                    .as_ref()
                    .is_none_or(|start| *key >= start)
            })
            .filter(|(key, _)| query.end_offset.as_ref().is_none_or(|end| *key < end))
            .filter(|(key, _)| page_token.as_ref().is_none_or(|token| *key > token))
            .map(|(key, (_, created_at))| ObjectRecord {
                name: key.clone(),
                created_at: *created_at,
            });

        let page: Vec<ObjectRecord> = matching.by_ref().take(PAGE_SIZE).collect();
        let next_page_token = match matching.next() {
            Some(_) => page.last().map(|o| o.name.clone()),
            None => None,
        };
        Ok(ObjectPage {
            objects: page,
            next_page_token,
        })
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| AppError::NotFound(format!("Object {}", key)))
    }
}

/// Job catalog with fixed jobs and seed run ids.
#[derive(Default)]
pub struct FakeCatalog {
    pub jobs: Vec<Job>,
    pub seeds: HashMap<String, String>,
}

#[async_trait]
impl JobCatalog for FakeCatalog {
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

/// Outcome of the install test in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Install {
    Passed,
    Failed,
    Missing,
}

fn install_junit(install: Install) -> Vec<u8> {
    let case = match install {
        Install::Passed => r#"<testcase name="install should succeed: overall" time="1800"/>"#,
        Install::Failed => {
            r#"<testcase name="install should succeed: overall" time="1800"><failure message="bootstrap failed">timed out</failure></testcase>"#
        }
        Install::Missing => r#"<testcase name="install should succeed: configuration" time="3"/>"#,
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><testsuites><testsuite name="cluster install" tests="1">{}</testsuite></testsuites>"#,
        case
    )
    .into_bytes()
}

fn prowjob(created_at: DateTime<Utc>, payload_tag: &str, finished: bool) -> Vec<u8> {
    serde_json::json!({
        "metadata": {
            "name": "run",
            "creationTimestamp": created_at,
            "labels": { PAYLOAD_TAG_LABEL: payload_tag },
        },
        "spec": {"job": "job", "cluster": "build02"},
        "status": {
            "state": if finished { "success" } else { "pending" },
            "startTime": created_at,
            "completionTime": finished.then_some(created_at + TimeDelta::hours(1)),
        },
    })
    .to_string()
    .into_bytes()
}

/// One payload with its start estimate and everything the analyzer reads.
pub struct Payload {
    pub start: DateTime<Utc>,
    pub store: FakeStore,
    pub jobs: Vec<Job>,
}

impl Payload {
    /// A payload that started long enough ago to skip the readiness wait.
    pub fn started_hours_ago(hours: i64) -> Self {
        Payload {
            start: Utc::now() - TimeDelta::hours(hours),
            store: FakeStore::default(),
            jobs: Vec::new(),
        }
    }

    pub fn job(&mut self, name: &str, platform: &str) -> &mut Self {
        self.jobs.push(Job {
            platform: platform.to_string(),
            network: "ovn".to_string(),
            ..Job::new(name)
        });
        self
    }

    /// Add a finished run of `job` created `minutes` after the start.
    pub fn run(&mut self, job: &str, run_id: &str, minutes: i64, install: Install) -> &mut Self {
        self.run_with(job, run_id, minutes, TAG, true, install)
    }

    pub fn run_with(
        &mut self,
        job: &str,
        run_id: &str,
        minutes: i64,
        payload_tag: &str,
        finished: bool,
        install: Install,
    ) -> &mut Self {
        let created_at = self.start + TimeDelta::minutes(minutes);
        let dir = format!("logs/{}/{}", job, run_id);
        self.store.put(
            &format!("{}/prowjob.json", dir),
            &prowjob(created_at, payload_tag, finished),
            created_at,
        );
        self.store.put(
            &format!("{}/artifacts/e2e/junit/junit_install.xml", dir),
            &install_junit(install),
            created_at,
        );
        self.store.put(&format!("logs/{}/latest-build.txt", job), run_id.as_bytes(), created_at);
        self
    }

    /// Build an analyzer that gates `install` on `required_passes`.
    pub fn analyzer(&self, working_dir: &Path, required_passes: usize) -> TestCaseAnalyzer {
        let catalog: Arc<dyn JobCatalog> = Arc::new(FakeCatalog {
            jobs: self.jobs.clone(),
            seeds: HashMap::new(),
        });
        let filter = JobFilter {
            platform: Some("aws".to_string()),
            ..JobFilter::default()
        };
        let job_getter = Arc::new(CatalogJobGetter::new(catalog.clone(), filter, Vec::new()));

        let options = AnalyzerOptions {
            selector: PayloadSelector::Tag(TAG.to_string()),
            working_dir: working_dir.to_path_buf(),
            job_start_estimate: self.start,
            timeout: Duration::from_secs(60),
            timing: AnalyzerTiming {
                poll_interval: Duration::from_millis(20),
                safety_margin: Duration::from_secs(1),
                search_window: SearchWindow::default(),
                ..AnalyzerTiming::default()
            },
            fan_out: FanOutSettings {
                max_concurrent_jobs: 2,
                retry: RetrySettings {
                    max_consecutive_failures: 1,
                    interval: Duration::from_millis(5),
                },
            },
        };

        let checkers: Vec<Box<dyn TestCaseChecker>> = vec![Box::new(MinimumRequiredPassesChecker {
            test: jobrun_analyzer_lib::models::TestIdentifier::install(),
            test_name_suffix: "platform:aws".to_string(),
            required_passes,
        })];

        TestCaseAnalyzer::new(
            options,
            job_getter,
            catalog,
            Arc::new(self.store.clone()),
            ArtifactLinks {
                bucket: "origin-ci-test".to_string(),
                human_url_base: "https://prow.example.com".to_string(),
                artifact_url_base: "https://gcsweb.example.com".to_string(),
            },
            checkers,
        )
    }
}

/// Parse the report written for [`TAG`].
pub fn read_report(working_dir: &Path) -> TestSuite {
    let path = working_dir.join(TAG).join(ANALYSIS_FILE_NAME);
    let data = std::fs::read(&path).unwrap();
    let mut parsed = TestSuites::from_xml(&data).unwrap();
    assert_eq!(parsed.suites.len(), 1);
    parsed.suites.remove(0)
}

/// The single synthetic case under `minimum-required-passes-checker / cluster install`.
pub fn synthetic_case(report: &TestSuite) -> &jobrun_analyzer_lib::models::TestCase {
    &report.children[0].children[0].test_cases[0]
}
