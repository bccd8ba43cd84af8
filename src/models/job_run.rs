//! Job run models: identifiers, run metadata and discovered runs.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Object name of the run metadata descriptor inside a run directory.
pub const METADATA_FILE_NAME: &str = "prowjob.json";

/// Rolling pointer file kept at the root of every job directory.
pub const LATEST_BUILD_MARKER: &str = "latest-build.txt";

/// Label carrying the release payload tag a run was started for.
pub const PAYLOAD_TAG_LABEL: &str = "release.openshift.io/analysis";

/// Label carrying the payload invocation id of PR-triggered runs.
pub const PAYLOAD_INVOCATION_ID_LABEL: &str = "release.openshift.io/aggregation-id";

/// Return the identifier that sorts right after every object of run `id`.
///
/// An empty id maps to `"0"`. Any other id must be a base-10 integer; the
/// result is that value plus one, without leading zeros.
pub fn next_run_id(id: &str) -> AppResult<String> {
    if id.is_empty() {
        return Ok("0".to_string());
    }

    if !id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(AppError::InvalidJobRunId(id.to_string()));
    }

    let value = id
        .parse::<u64>()
        .map_err(|_| AppError::InvalidJobRunId(id.to_string()))?;
    let next = value
        .checked_add(1)
        .ok_or_else(|| AppError::InvalidJobRunId(id.to_string()))?;

    Ok(next.to_string())
}

/// Kubernetes-style object metadata of a run descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub creation_timestamp: DateTime<Utc>,
}

/// Run spec fields used for reporting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSpec {
    #[serde(default)]
    pub job: String,
    #[serde(default)]
    pub cluster: String,
}

/// Run status as reported by the CI system.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_time: Option<DateTime<Utc>>,
}

/// Structured status record stored as `prowjob.json` in each run directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub metadata: RunObjectMeta,
    #[serde(default)]
    pub spec: RunSpec,
    #[serde(default)]
    pub status: RunStatus,
}

impl RunMetadata {
    /// Parse a run descriptor from raw bytes.
    pub fn from_bytes(data: &[u8]) -> AppResult<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Get a label value.
    pub fn label(&self, key: &str) -> Option<&str> {
        self.metadata.labels.get(key).map(String::as_str)
    }

    /// A run is finished once the CI system recorded its completion time.
    pub fn is_finished(&self) -> bool {
        self.status.completion_time.is_some()
    }
}

/// Base URLs used to build evidence links for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLinks {
    /// Bucket name as it appears in links
    pub bucket: String,
    /// Base of the human-readable job viewer
    pub human_url_base: String,
    /// Base of the raw artifact browser
    pub artifact_url_base: String,
}

impl ArtifactLinks {
    /// Human-readable URL for a run.
    ///
    /// Format: {human_url_base}/view/gs/{bucket}/{storage_root}/{run_id}
    pub fn human_url(&self, storage_root: &str, run_id: &str) -> String {
        format!(
            "{}/view/gs/{}/{}/{}",
            self.human_url_base.trim_end_matches('/'),
            self.bucket,
            storage_root,
            run_id
        )
    }

    /// Artifact browser URL for a run.
    ///
    /// Format: {artifact_url_base}/gcs/{bucket}/{storage_root}/{run_id}/
    pub fn artifact_url(&self, storage_root: &str, run_id: &str) -> String {
        format!(
            "{}/gcs/{}/{}/{}/",
            self.artifact_url_base.trim_end_matches('/'),
            self.bucket,
            storage_root,
            run_id
        )
    }
}

/// One concrete, validated execution of a job.
///
/// Only constructed once the run's metadata descriptor was found and fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRun {
    pub job_name: String,
    pub run_id: String,
    /// Storage prefix holding all run directories of the job
    pub storage_root: String,
    /// Object key of the metadata descriptor
    pub metadata_path: String,
    /// Object keys of JUnit result files, in listing order
    pub junit_paths: Vec<String>,
    pub metadata: RunMetadata,
    pub human_url: String,
    pub artifact_url: String,
}

impl JobRun {
    /// Whether the run has completed.
    pub fn is_finished(&self) -> bool {
        self.metadata.is_finished()
    }
}

impl std::fmt::Display for JobRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.job_name, self.run_id)
    }
}
