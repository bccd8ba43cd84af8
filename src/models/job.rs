//! Job models read from the warehouse.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// A CI job definition as recorded in the job catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Job name, also the directory name under `logs/` in storage
    pub name: String,
    /// Cloud platform (aws, gcp, ...); empty when unknown
    #[serde(default)]
    pub platform: String,
    /// Network plugin (ovn, sdn); empty when unknown
    #[serde(default)]
    pub network: String,
    /// CPU architecture; empty when unknown
    #[serde(default)]
    pub architecture: String,
}

impl Job {
    /// Create a job with no facet attributes.
    pub fn new(name: impl Into<String>) -> Self {
        Job {
            name: name.into(),
            platform: String::new(),
            network: String::new(),
            architecture: String::new(),
        }
    }

    /// Installation infrastructure, derived from the job name.
    pub fn infrastructure(&self) -> &'static str {
        if self.name.contains("upi") {
            "upi"
        } else {
            "ipi"
        }
    }
}

/// Explicit association between a job and its storage prefix.
///
/// Pull-request payload jobs are stored under per-PR prefixes rather than
/// `logs/<job>`, so the caller names them directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobGcsPrefix {
    pub job_name: String,
    pub gcs_prefix: String,
}

impl JobGcsPrefix {
    /// Parse a comma-separated list of `job=prefix` pairs.
    ///
    /// An empty string yields an empty list.
    pub fn parse_list(value: &str) -> AppResult<Vec<Self>> {
        if value.trim().is_empty() {
            return Ok(Vec::new());
        }

        value
            .split(',')
            .map(|pair| {
                let parts: Vec<&str> = pair.split('=').collect();
                if parts.len() != 2 || parts[0].trim().is_empty() || parts[1].trim().is_empty() {
                    return Err(AppError::InvalidInput(format!(
                        "GCS prefix '{}' should consist of job name and prefix separated by '='",
                        pair
                    )));
                }
                Ok(JobGcsPrefix {
                    job_name: parts[0].trim().to_string(),
                    gcs_prefix: parts[1].trim().trim_end_matches('/').to_string(),
                })
            })
            .collect()
    }
}

impl std::fmt::Display for JobGcsPrefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.job_name, self.gcs_prefix)
    }
}
