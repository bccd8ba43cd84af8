//! Object storage access for CI job artifacts.
//!
//! Job runs live under prefix-ordered keys (`logs/<job>/<run id>/...`) and the
//! only listing primitive is prefix plus start/end offsets. Supports both AWS
//! S3 and MinIO for development.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{Credentials, Region};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::S3Config;
use crate::error::{AppError, AppResult};

/// Listing bounds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    /// Only keys starting with this prefix
    pub prefix: String,
    /// Inclusive lower bound on keys
    pub start_offset: Option<String>,
    /// Exclusive upper bound on keys
    pub end_offset: Option<String>,
}

/// Listed object: key and creation time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a listing, in ascending key order.
#[derive(Debug, Clone, Default)]
pub struct ObjectPage {
    pub objects: Vec<ObjectRecord>,
    /// Token for the following page; `None` once the listing is exhausted
    pub next_page_token: Option<String>,
}

/// Object listing and fetch collaborator. Implementations must be safe for
/// concurrent use.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List one page of objects matching `query`.
    async fn list_page(&self, query: &ListQuery, page_token: Option<String>)
        -> AppResult<ObjectPage>;

    /// Read an object's content.
    async fn read(&self, key: &str) -> AppResult<Vec<u8>>;
}

/// Forward-only iterator over a listing.
///
/// Cannot seek: moving the start offset means building a new iterator.
pub struct ObjectIterator {
    store: Arc<dyn ObjectStore>,
    query: ListQuery,
    buffer: VecDeque<ObjectRecord>,
    page_token: Option<String>,
    exhausted: bool,
}

impl ObjectIterator {
    pub fn new(store: Arc<dyn ObjectStore>, query: ListQuery) -> Self {
        Self {
            store,
            query,
            buffer: VecDeque::new(),
            page_token: None,
            exhausted: false,
        }
    }

    /// Next object in key order, fetching pages as needed.
    pub async fn next_object(&mut self) -> AppResult<Option<ObjectRecord>> {
        loop {
            if let Some(record) = self.buffer.pop_front() {
                return Ok(Some(record));
            }
            if self.exhausted {
                return Ok(None);
            }

            let page = self
                .store
                .list_page(&self.query, self.page_token.take())
                .await?;
            self.buffer.extend(page.objects);
            self.page_token = page.next_page_token;
            self.exhausted = self.page_token.is_none();
        }
    }
}

/// S3 storage client wrapper.
#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
}

impl Storage {
    /// Create a new S3 storage client from configuration.
    pub async fn new(config: &S3Config) -> AppResult<Self> {
        let credentials =
            Credentials::new(&config.access_key, &config.secret_key, None, None, "jra");

        let region = Region::new(config.region.clone());

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(region)
            .credentials_provider(credentials)
            .force_path_style(true); // Required for MinIO

        // Use custom endpoint for MinIO in development
        if let Some(ref endpoint) = config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let s3_config = s3_config_builder.build();
        let client = Client::from_conf(s3_config);

        let storage = Self {
            client,
            bucket: config.bucket.clone(),
        };

        // Artifacts are written by CI; the bucket is never created here
        storage.check_bucket_access().await?;

        info!("S3 storage initialized: bucket={}", config.bucket);

        Ok(storage)
    }

    async fn check_bucket_access(&self) -> AppResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to access bucket '{}': {}",
                    self.bucket,
                    e.into_service_error()
                ))
            })?;
        Ok(())
    }

    /// Bucket name, as used in evidence links.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl ObjectStore for Storage {
    /// S3 has no inclusive start offset; `start_after` is used instead. Run
    /// directory offsets such as `logs/job/123` never name an object, so the
    /// two are equivalent here. The end offset is applied client-side.
    async fn list_page(
        &self,
        query: &ListQuery,
        page_token: Option<String>,
    ) -> AppResult<ObjectPage> {
        let response = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(&query.prefix)
            .set_start_after(query.start_offset.clone())
            .set_continuation_token(page_token)
            .send()
            .await
            .map_err(|e| {
                AppError::Storage(format!(
                    "Failed to list objects under '{}': {}",
                    query.prefix,
                    e.into_service_error()
                ))
            })?;

        let mut objects = Vec::new();
        let mut reached_end = false;
        for object in response.contents() {
            let Some(key) = object.key() else {
                continue;
            };
            if let Some(ref end) = query.end_offset
                && key >= end.as_str()
            {
                reached_end = true;
                break;
            }

            let created_at = object
                .last_modified()
                .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                .ok_or_else(|| {
                    AppError::Storage(format!("Object '{}' has no modification time", key))
                })?;

            objects.push(ObjectRecord {
                name: key.to_string(),
                created_at,
            });
        }

        let next_page_token = if reached_end {
            None
        } else {
            response.next_continuation_token().map(String::from)
        };

        Ok(ObjectPage {
            objects,
            next_page_token,
        })
    }

    async fn read(&self, key: &str) -> AppResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.into_service_error();
                if service_error.is_no_such_key() {
                    AppError::NotFound(format!("Object {}", key))
                } else {
                    AppError::Storage(format!("Failed to get object from S3: {}", service_error))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read S3 response body: {}", e)))?
            .into_bytes()
            .to_vec();

        Ok(data)
    }
}
