//! Domain models for the job run analyzer.

pub mod job;
pub mod job_run;
pub mod junit;
pub mod test_case;

// Re-export commonly used types
pub use job::{Job, JobGcsPrefix};
pub use job_run::{
    next_run_id, ArtifactLinks, JobRun, RunMetadata, LATEST_BUILD_MARKER, METADATA_FILE_NAME,
    PAYLOAD_INVOCATION_ID_LABEL, PAYLOAD_TAG_LABEL,
};
pub use junit::{FailureOutput, SkipMessage, TestCase, TestSuite, TestSuites};
pub use test_case::{
    JobRunReference, TestCaseDetails, TestIdentifier, TestVerdict, INSTALL_TEST_GROUP,
    TEST_SUITES_SEPARATOR,
};
