//! Database queries for jobs and their runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use crate::entity::job::{self, Entity as JobEntity};
use crate::entity::job_run::{self, Entity as JobRunEntity};
use crate::error::{AppError, AppResult};
use crate::models::Job;
use crate::services::job_getter::JobCatalog;

use super::DbPool;

impl From<job::Model> for Job {
    fn from(model: job::Model) -> Self {
        Job {
            name: model.job_name,
            platform: model.platform,
            network: model.network,
            architecture: model.architecture,
        }
    }
}

impl DbPool {
    /// List every job, ordered by name.
    pub async fn list_all_jobs(&self) -> AppResult<Vec<Job>> {
        let models = JobEntity::find()
            .order_by_asc(job::Column::JobName)
            .all(self.connection())
            .await
            .map_err(|e| AppError::Database(format!("Failed to list jobs: {}", e)))?;

        Ok(models.into_iter().map(Job::from).collect())
    }

    /// Get the newest run of a job that started before `before`.
    pub async fn latest_job_run_before(
        &self,
        job_name: &str,
        before: DateTime<Utc>,
    ) -> AppResult<Option<job_run::Model>> {
        JobRunEntity::find()
            .filter(job_run::Column::JobName.eq(job_name))
            .filter(job_run::Column::StartTime.lt(before))
            .order_by_desc(job_run::Column::StartTime)
            .one(self.connection())
            .await
            .map_err(|e| {
                AppError::Database(format!("Failed to get last job run of {}: {}", job_name, e))
            })
    }
}

#[async_trait]
impl JobCatalog for DbPool {
    async fn list_all_jobs(&self) -> AppResult<Vec<Job>> {
        DbPool::list_all_jobs(self).await
    }

    async fn latest_job_run_before(
        &self,
        job_name: &str,
        before: DateTime<Utc>,
    ) -> AppResult<Option<String>> {
        let run = DbPool::latest_job_run_before(self, job_name, before).await?;
        Ok(run.map(|run| run.name))
    }
}
