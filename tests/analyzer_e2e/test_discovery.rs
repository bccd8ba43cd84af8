//! E2E tests: job run discovery and waiting.

use std::time::{Duration, Instant};

use jobrun_analyzer_lib::error::AppError;
use jobrun_analyzer_lib::models::TestCaseDetails;
use tokio_util::sync::CancellationToken;

use super::test_helpers::*;

/// No payload runs at all is its own soft condition and writes no report.
#[tokio::test]
async fn test_no_related_job_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::started_hours_ago(2);
    payload
        .job("periodic-e2e-aws-ovn", "aws")
        .run_with("periodic-e2e-aws-ovn", "1001", 5, "4.10.0-0.nightly", true, Install::Passed);

    let err = payload
        .analyzer(dir.path(), 1)
        .run(&CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NoRelatedJobs));
    assert!(err.is_soft());
    assert!(!dir.path().join(TAG).join("junit-test-case-analysis.xml").exists());
}

/// Runs of other payloads and runs older than the search window are ignored.
#[tokio::test]
async fn test_only_payload_runs_in_window_are_counted() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::started_hours_ago(2);
    payload
        .job("periodic-e2e-aws-ovn", "aws")
        // an hour and a half before the start estimate, outside the window
        .run("periodic-e2e-aws-ovn", "1001", -90, Install::Passed)
        .run_with("periodic-e2e-aws-ovn", "1002", -10, "4.10.0-0.nightly", true, Install::Passed)
        .run("periodic-e2e-aws-ovn", "1003", 5, Install::Failed);

    let err = payload
        .analyzer(dir.path(), 1)
        .run(&CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::TestCheckerFailed));

    let details: TestCaseDetails =
        serde_yaml::from_str(&synthetic_case(&read_report(dir.path())).system_out).unwrap();
    assert_eq!(details.summary, "Total job runs: 1, passes: 0, failures: 1, skips 0");
}

/// Past the stop-waiting time, unfinished runs are analyzed as they are.
#[tokio::test]
async fn test_unfinished_runs_included_after_stop_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::started_hours_ago(2);
    payload
        .job("periodic-e2e-aws-ovn", "aws")
        .run("periodic-e2e-aws-ovn", "1001", 5, Install::Passed)
        .run_with("periodic-e2e-aws-ovn", "1002", 10, TAG, false, Install::Passed);

    let report_path = payload
        .analyzer(dir.path(), 2)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert!(report_path.exists());
}

/// A payload started more than the grace period ago is analyzed without waiting.
#[tokio::test]
async fn test_readiness_wait_skipped_for_old_payload() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::started_hours_ago(3);
    payload
        .job("periodic-e2e-aws-ovn", "aws")
        .run("periodic-e2e-aws-ovn", "1001", 5, Install::Passed);

    let started = Instant::now();
    payload
        .analyzer(dir.path(), 1)
        .run(&CancellationToken::new())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// A fresh payload waits for readiness, and that wait can be cancelled.
#[tokio::test]
async fn test_readiness_wait_observes_cancellation() {
    let dir = tempfile::tempdir().unwrap();
    let mut payload = Payload::started_hours_ago(0);
    payload.job("periodic-e2e-aws-ovn", "aws");

    let cancel = CancellationToken::new();
    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        canceller.cancel();
    });

    let err = payload.analyzer(dir.path(), 1).run(&cancel).await.unwrap_err();
    assert!(matches!(err, AppError::Cancelled(_)));
    // output directory exists even though nothing was written
    assert!(dir.path().join(TAG).is_dir());
}
