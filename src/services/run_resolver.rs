//! Resolves one run id into a validated job run.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::AppResult;
use crate::models::{next_run_id, ArtifactLinks, JobRun, RunMetadata, TestSuites, METADATA_FILE_NAME};
use crate::services::storage::{ListQuery, ObjectIterator, ObjectStore};

/// Listing bounds covering exactly the objects of one run.
///
/// The range is `[root/id, root/next(id))`. When the next id sorts before
/// the id (`9` to `10`) the range would be empty, so the run directory
/// prefix is listed instead.
fn run_listing(storage_root: &str, run_id: &str, next_id: &str) -> ListQuery {
    let start = format!("{}/{}", storage_root, run_id);
    let end = format!("{}/{}", storage_root, next_id);

    if end > start {
        ListQuery {
            prefix: format!("{}/", storage_root),
            start_offset: Some(start),
            end_offset: Some(end),
        }
    } else {
        ListQuery {
            prefix: format!("{}/", start),
            start_offset: None,
            end_offset: None,
        }
    }
}

/// Collect the artifacts of run `run_id` under `storage_root`.
///
/// Returns `Ok(None)` when the run has no metadata descriptor yet, even if
/// result files already landed. Failing to fetch or parse an existing
/// descriptor is an error.
pub async fn read_job_run(
    store: &Arc<dyn ObjectStore>,
    links: &ArtifactLinks,
    storage_root: &str,
    job_name: &str,
    run_id: &str,
) -> AppResult<Option<JobRun>> {
    let next_id = next_run_id(run_id)?;
    let run_prefix = format!("{}/{}/", storage_root, run_id);

    let mut objects = ObjectIterator::new(store.clone(), run_listing(storage_root, run_id, &next_id));
    let mut metadata_path = None;
    let mut junit_paths = Vec::new();

    while let Some(record) = objects.next_object().await? {
        // The range also covers ids sharing this prefix, e.g. 120 for 12
        let Some(rest) = record.name.strip_prefix(&run_prefix) else {
            continue;
        };

        if rest == METADATA_FILE_NAME {
            metadata_path = Some(record.name);
        } else if record.name.ends_with(".xml") && record.name.contains("/junit") {
            junit_paths.push(record.name);
        }
    }

    let Some(metadata_path) = metadata_path else {
        debug!(
            "No {} for {}/{} yet ({} result files)",
            METADATA_FILE_NAME,
            job_name,
            run_id,
            junit_paths.len()
        );
        return Ok(None);
    };

    let metadata = RunMetadata::from_bytes(&store.read(&metadata_path).await?)?;

    Ok(Some(JobRun {
        job_name: job_name.to_string(),
        run_id: run_id.to_string(),
        storage_root: storage_root.to_string(),
        metadata_path,
        junit_paths,
        metadata,
        human_url: links.human_url(storage_root, run_id),
        artifact_url: links.artifact_url(storage_root, run_id),
    }))
}

/// Fetch and parse every result file of a run into one suite forest.
pub async fn read_combined_junit(store: &Arc<dyn ObjectStore>, run: &JobRun) -> AppResult<TestSuites> {
    let mut combined = TestSuites::default();
    for path in &run.junit_paths {
        let data = store.read(path).await?;
        let parsed = TestSuites::from_xml(&data).inspect_err(|e| {
            warn!("Failed to parse {} of {}: {}", path, run, e);
        })?;
        combined.suites.extend(parsed.suites);
    }
    Ok(combined)
}
