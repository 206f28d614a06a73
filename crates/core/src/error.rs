//! Job error model.

use thiserror::Error;

use crate::id::JobId;
use crate::job::JobStatus;

/// Result type used across the job domain.
pub type JobResult<T> = Result<T, JobError>;

/// Failure of a job operation.
///
/// `InvalidArgument`, `NotFound`, `InvalidTransition` and `Storage` are
/// surfaced to the caller of a synchronous operation. `Notification` only
/// ever occurs inside the completion step and is logged, never returned.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JobError {
    /// A required creation field was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No job with this identifier exists.
    #[error("job not found: {0}")]
    NotFound(JobId),

    /// The job is not in a state that allows the requested transition.
    #[error("job {id} is {current}, cannot move to {requested}")]
    InvalidTransition {
        id: JobId,
        current: JobStatus,
        requested: JobStatus,
    },

    /// The persistence layer failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Delivering the completion notification failed.
    #[error("notification error: {0}")]
    Notification(String),
}

impl JobError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }
}
