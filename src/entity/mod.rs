//! SeaORM entities for the job warehouse.

pub mod job;
pub mod job_run;
