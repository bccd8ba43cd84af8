//! Job run analyzer library.
//!
//! Discovers the CI job runs that belong to one release payload, waits for
//! them to finish and gates the payload on how often each tracked test
//! passed across those runs.

pub mod config;
pub mod db;
pub mod entity;
pub mod error;
pub mod models;
pub mod services;
