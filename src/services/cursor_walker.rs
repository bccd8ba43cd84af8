//! Job run id discovery over a prefix-ordered object listing.
//!
//! The walker lists `<job root>/` and classifies each object. Objects outside
//! the useful age band move the cursor to the next run; a run's metadata
//! descriptor emits the run id and also moves the cursor. Every cursor move
//! starts a fresh listing since iterators cannot seek.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AppError, AppResult};
use crate::models::{next_run_id, LATEST_BUILD_MARKER, METADATA_FILE_NAME};
use crate::services::storage::{ListQuery, ObjectIterator, ObjectRecord, ObjectStore};

/// Capacity of the run id channel. The walker blocks when the consumer lags.
pub const RUN_ID_CHANNEL_CAPACITY: usize = 100;

/// Object age limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgeBands {
    /// Objects older than this cannot belong to a run of interest
    pub too_old: TimeDelta,
    /// Objects younger than this belong to runs that cannot be done yet
    pub too_young: TimeDelta,
}

/// What to do with one listed object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorDecision {
    Ignore,
    /// Skip the rest of this run
    FastForward(String),
    /// Emit this run id, then skip the rest of the run
    Candidate(String),
}

/// Classify a listed object. `job_root` has no trailing slash.
pub fn classify(
    job_root: &str,
    record: &ObjectRecord,
    bands: &AgeBands,
    now: DateTime<Utc>,
) -> CursorDecision {
    if record.name.ends_with(LATEST_BUILD_MARKER) {
        return CursorDecision::Ignore;
    }

    let Some((run_id, rest)) = record
        .name
        .strip_prefix(job_root)
        .and_then(|name| name.strip_prefix('/'))
        .and_then(|name| name.split_once('/'))
    else {
        return CursorDecision::Ignore;
    };
    if run_id.is_empty() {
        return CursorDecision::Ignore;
    }

    let age = now - record.created_at;
    if age > bands.too_old || age < bands.too_young {
        return CursorDecision::FastForward(run_id.to_string());
    }

    if rest == METADATA_FILE_NAME {
        CursorDecision::Candidate(run_id.to_string())
    } else {
        CursorDecision::Ignore
    }
}

/// Receiving side of a walk.
///
/// `ids` closes when the walk ends for any reason. A failed walk sends its
/// error on `errors` before closing `ids`.
pub struct JobRunIdStream {
    pub ids: mpsc::Receiver<String>,
    pub errors: mpsc::Receiver<AppError>,
}

/// Start walking `job_root` in a background task.
///
/// `starting_id`, when known, is the first run id worth looking at.
/// Cancelling `cancel` ends the walk quietly.
pub fn list_job_run_ids(
    store: Arc<dyn ObjectStore>,
    job_root: String,
    starting_id: Option<String>,
    bands: AgeBands,
    now: DateTime<Utc>,
    cancel: CancellationToken,
) -> JobRunIdStream {
    let (id_tx, id_rx) = mpsc::channel(RUN_ID_CHANNEL_CAPACITY);
    let (error_tx, error_rx) = mpsc::channel(1);

    tokio::spawn(async move {
        let result = walk(store, &job_root, starting_id, bands, now, &id_tx, &cancel).await;
        if let Err(e) = result {
            let _ = error_tx.try_send(e);
        }
        drop(id_tx);
    });

    JobRunIdStream {
        ids: id_rx,
        errors: error_rx,
    }
}

async fn walk(
    store: Arc<dyn ObjectStore>,
    job_root: &str,
    starting_id: Option<String>,
    bands: AgeBands,
    now: DateTime<Utc>,
    ids: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> AppResult<()> {
    let prefix = format!("{}/", job_root);
    let mut start_offset = starting_id.map(|id| format!("{}{}", prefix, id));
    let mut emitted = HashSet::new();

    'listing: loop {
        debug!(
            "Listing {} from {}",
            prefix,
            start_offset.as_deref().unwrap_or("the beginning")
        );
        let query = ListQuery {
            prefix: prefix.clone(),
            start_offset: start_offset.clone(),
            end_offset: None,
        };
        let mut objects = ObjectIterator::new(store.clone(), query);

        loop {
            let record = tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                next = objects.next_object() => next?,
            };
            let Some(record) = record else {
                return Ok(());
            };

            let run_id = match classify(job_root, &record, &bands, now) {
                CursorDecision::Ignore => continue,
                CursorDecision::FastForward(run_id) => {
                    debug!("Skipping run {} of {}: outside age band", run_id, job_root);
                    run_id
                }
                CursorDecision::Candidate(run_id) => {
                    // Validated before emitting so a malformed id is never sent
                    next_run_id(&run_id)?;
                    if emitted.insert(run_id.clone()) {
                        info!("Queued job run {}/{}", job_root, run_id);
                        tokio::select! {
                            _ = cancel.cancelled() => return Ok(()),
                            sent = ids.send(run_id.clone()) => {
                                if sent.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                    }
                    run_id
                }
            };

            let next_offset = format!("{}{}", prefix, next_run_id(&run_id)?);
            if advance_cursor(&mut start_offset, next_offset) {
                continue 'listing;
            }
        }
    }
}

/// Move the cursor forward. Returns false when `candidate` would not move
/// it past the current offset, e.g. `9` to `10` which sorts backwards.
fn advance_cursor(current: &mut Option<String>, candidate: String) -> bool {
    if current
        .as_deref()
        .is_some_and(|offset| offset >= candidate.as_str())
    {
        return false;
    }
    *current = Some(candidate);
    true
}
