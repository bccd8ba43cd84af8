//! Domain error types for the job run analyzer.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Job catalog (warehouse) query failed
    #[error("Database error: {0}")]
    Database(String),

    /// Object storage listing or fetch failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Resource not found
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid input data
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A job run identifier that is not a base-10 integer.
    ///
    /// Run directories are named by numeric ids. Never retried.
    #[error("Invalid job run ID '{0}': expected a base-10 integer")]
    InvalidJobRunId(String),

    /// Local file system operation failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Output could not be serialized or a result file could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The shared cancellation signal fired
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// One job has no runs of the payload yet
    #[error("no job runs found yet for {0}")]
    NoJobRunsYet(String),

    /// No job runs matched the payload
    #[error("no related job runs found for the payload")]
    NoRelatedJobs,

    /// At least one synthetic test case did not meet its gate
    #[error("test case checkers reported failures")]
    TestCheckerFailed,
}

impl AppError {
    /// Conditions that are reported but are not operational failures.
    pub fn is_soft(&self) -> bool {
        matches!(self, AppError::NoRelatedJobs | AppError::TestCheckerFailed)
    }

    /// Invariant violations that must abort the whole analysis.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::InvalidJobRunId(_))
    }

    /// Errors the job run locator retries.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal() && !matches!(self, AppError::Cancelled(_))
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

// Conversion implementations for common error types

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::InvalidInput(format!("JSON parsing error: {}", err))
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}
