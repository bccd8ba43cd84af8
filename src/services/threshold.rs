//! Minimum pass count gate across job runs.

use std::time::Instant;

use tracing::warn;

use crate::error::AppResult;
use crate::models::{
    FailureOutput, JobRun, TestCase, TestCaseDetails, TestIdentifier, TestSuite, TestSuites,
    TestVerdict,
};
use crate::services::suite_matcher::test_verdict;

/// Name of the synthetic suite wrapping each checker's result.
pub const MINIMUM_PASSES_SUITE: &str = "minimum-required-passes-checker";

/// A job run together with its combined JUnit forest.
#[derive(Debug, Clone)]
pub struct JobRunJunit {
    pub job_run: JobRun,
    pub suites: TestSuites,
}

/// Judges one test across all job runs and reports as a synthetic suite.
pub trait TestCaseChecker: Send + Sync {
    fn check_test_case(&self, runs: &[JobRunJunit]) -> AppResult<TestSuite>;
}

/// Fails the test unless it passed in at least `required_passes` runs.
#[derive(Debug, Clone)]
pub struct MinimumRequiredPassesChecker {
    pub test: TestIdentifier,
    /// Appended to the synthetic test name, e.g. variant information
    pub test_name_suffix: String,
    pub required_passes: usize,
}

impl MinimumRequiredPassesChecker {
    fn synthetic_test_name(&self) -> String {
        let mut name = format!(
            "test '{}' has required number of successful passes across payload jobs",
            self.test.test_name
        );
        if !self.test_name_suffix.is_empty() {
            name.push_str(&format!(" for {}", self.test_name_suffix));
        }
        name
    }
}

impl TestCaseChecker for MinimumRequiredPassesChecker {
    fn check_test_case(&self, runs: &[JobRunJunit]) -> AppResult<TestSuite> {
        let started = Instant::now();
        let mut details = TestCaseDetails::new(&self.test);

        for run in runs {
            let verdict = run
                .suites
                .suites
                .iter()
                .map(|suite| test_verdict(&self.test, suite))
                .find(TestVerdict::is_decided)
                .unwrap_or(TestVerdict::Skipped);
            details.record(&run.job_run, verdict);
        }
        details.summarize(runs.len());

        let success_count = details.passes.len();
        let mut case = TestCase::new(self.synthetic_test_name());
        case.system_out = details.to_yaml()?;
        if success_count < self.required_passes {
            case.failure = Some(FailureOutput {
                message: format!(
                    "required minimum successful count {}, got {}",
                    self.required_passes, success_count
                ),
                output: String::new(),
            });
        }
        case.duration = started.elapsed().as_secs_f64();

        let mut top = TestSuite::new(MINIMUM_PASSES_SUITE);
        top.add_suite_path(&self.test.test_suites)
            .test_cases
            .push(case);
        top.update_test_counts();
        Ok(top)
    }
}

/// Variant qualifier for synthetic test names.
pub fn test_name_suffix(platform: &str, network: &str, infrastructure: &str) -> String {
    let mut parts = Vec::new();
    if !platform.is_empty() {
        parts.push(format!("platform:{}", platform));
    }
    if !network.is_empty() {
        parts.push(format!("network:{}", network));
    }
    if !infrastructure.is_empty() {
        parts.push(format!("infrastructure:{}", infrastructure));
    }
    parts.join(" ")
}

/// Log every failing test case below `suite`, with its suite path.
pub fn output_test_case_failures(parents: &[&str], suite: &TestSuite) {
    let mut path: Vec<&str> = parents.to_vec();
    path.push(&suite.name);

    for case in &suite.test_cases {
        if let Some(ref failure) = case.failure {
            warn!(
                "Test failed: {} / {}: {}",
                path.join(" / "),
                case.name,
                failure.message
            );
        }
    }
    for child in &suite.children {
        output_test_case_failures(&path, child);
    }
}
