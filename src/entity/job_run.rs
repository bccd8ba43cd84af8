//! Job run entity for SeaORM.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "job_runs")]
pub struct Model {
    /// Run id, unique across jobs
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub job_name: String,
    /// Final state as reported by the CI system (success, failure, ...)
    pub status: String,
    pub start_time: DateTimeUtc,
    pub end_time: Option<DateTimeUtc>,
    pub release_tag: Option<String>,
    pub cluster: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
