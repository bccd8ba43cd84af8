//! Test identifiers, verdicts and per-test aggregation details.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::job_run::JobRun;

/// Separator used when a suite path is rendered as a single string.
pub const TEST_SUITES_SEPARATOR: &str = "|||";

/// Name of the test group holding the cluster install test.
pub const INSTALL_TEST_GROUP: &str = "install";

/// Locates a test case inside a JUnit tree.
///
/// `test_suites` is the path of suite names from the root; `test_name` is the
/// case name inside the innermost suite.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestIdentifier {
    pub test_suites: Vec<String>,
    pub test_name: String,
}

impl TestIdentifier {
    pub fn new(test_suites: &[&str], test_name: &str) -> Self {
        TestIdentifier {
            test_suites: test_suites.iter().map(|s| s.to_string()).collect(),
            test_name: test_name.to_string(),
        }
    }

    /// The overall cluster install test.
    pub fn install() -> Self {
        TestIdentifier::new(&["cluster install"], "install should succeed: overall")
    }

    /// Tests belonging to a named test group, or `None` for an unknown group.
    pub fn for_test_group(group: &str) -> Option<Vec<Self>> {
        match group {
            INSTALL_TEST_GROUP => Some(vec![TestIdentifier::install()]),
            _ => None,
        }
    }

    /// Suite path joined with [`TEST_SUITES_SEPARATOR`].
    pub fn joined_suites(&self) -> String {
        self.test_suites.join(TEST_SUITES_SEPARATOR)
    }
}

impl std::fmt::Display for TestIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for suite in &self.test_suites {
            write!(f, "{} / ", suite)?;
        }
        write!(f, "{}", self.test_name)
    }
}

/// Outcome of a test in one job run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestVerdict {
    Passed,
    Failed,
    Skipped,
}

impl TestVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestVerdict::Passed => "passed",
            TestVerdict::Failed => "failed",
            TestVerdict::Skipped => "skipped",
        }
    }

    /// Passed and Failed are decisive; Skipped means "keep looking".
    pub fn is_decided(&self) -> bool {
        !matches!(self, TestVerdict::Skipped)
    }
}

impl std::fmt::Display for TestVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Evidence link to one job run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRunReference {
    #[serde(rename = "jobrunid")]
    pub job_run_id: String,
    #[serde(rename = "humanurl")]
    pub human_url: String,
    #[serde(rename = "gcsartifacturl")]
    pub gcs_artifact_url: String,
}

impl From<&JobRun> for JobRunReference {
    fn from(run: &JobRun) -> Self {
        JobRunReference {
            job_run_id: run.run_id.clone(),
            human_url: run.human_url.clone(),
            gcs_artifact_url: run.artifact_url.clone(),
        }
    }
}

/// Aggregated results of one test across all job runs.
///
/// Serialized as YAML into the synthetic test case's system-out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCaseDetails {
    pub name: String,
    #[serde(rename = "testsuitename")]
    pub test_suite_name: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub passes: Vec<JobRunReference>,
    #[serde(default)]
    pub failures: Vec<JobRunReference>,
    #[serde(default)]
    pub skips: Vec<JobRunReference>,
}

impl TestCaseDetails {
    pub fn new(test: &TestIdentifier) -> Self {
        TestCaseDetails {
            name: test.test_name.clone(),
            test_suite_name: test.joined_suites(),
            ..Default::default()
        }
    }

    /// Record the verdict of one job run.
    pub fn record(&mut self, run: &JobRun, verdict: TestVerdict) {
        let reference = JobRunReference::from(run);
        match verdict {
            TestVerdict::Passed => self.passes.push(reference),
            TestVerdict::Failed => self.failures.push(reference),
            TestVerdict::Skipped => self.skips.push(reference),
        }
    }

    /// Fill in the one-line summary.
    pub fn summarize(&mut self, total_job_runs: usize) {
        self.summary = format!(
            "Total job runs: {}, passes: {}, failures: {}, skips {}",
            total_job_runs,
            self.passes.len(),
            self.failures.len(),
            self.skips.len()
        );
    }

    pub fn to_yaml(&self) -> AppResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| AppError::Serialization(format!("Failed to write test details: {}", e)))
    }
}
