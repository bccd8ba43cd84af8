//! Business logic services.

pub mod analyzer;
pub mod cursor_walker;
pub mod fan_out;
pub mod job_getter;
pub mod job_run_locator;
pub mod run_resolver;
pub mod storage;
pub mod suite_matcher;
pub mod threshold;
pub mod wait;

#[cfg(test)]
pub mod testing;

pub use analyzer::{AnalyzerOptions, AnalyzerTiming, PayloadSelector, TestCaseAnalyzer};
pub use fan_out::FanOutSettings;
pub use job_getter::{CatalogJobGetter, JobCatalog, JobFilter, JobGetter};
pub use job_run_locator::{RetrySettings, SearchWindow};
pub use storage::{ListQuery, ObjectPage, ObjectRecord, ObjectStore, Storage};
pub use threshold::{MinimumRequiredPassesChecker, TestCaseChecker};
