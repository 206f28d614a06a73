//! The job entity and its lifecycle rules.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{JobError, JobResult};
use crate::id::JobId;
use crate::priority::{Priority, PriorityPolicy};

/// Structured job payload: a JSON object.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Lifecycle status of a job.
///
/// The only legal path is `Pending -> Running -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 3] = [JobStatus::Pending, JobStatus::Running, JobStatus::Completed];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
        }
    }

    /// The status that legally follows this one, if any.
    pub fn next(&self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Running),
            JobStatus::Running => Some(JobStatus::Completed),
            JobStatus::Completed => None,
        }
    }

    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        self.next() == Some(to)
    }

}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            other => Err(JobError::invalid_argument(format!(
                "status must be one of: pending, running, completed (got {other:?})"
            ))),
        }
    }
}

/// A validated request to create a job.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub task_name: String,
    pub payload: JsonObject,
    pub priority: Priority,
}

impl NewJob {
    /// Validate raw creation input.
    ///
    /// `task_name` and `priority` are required and must not be blank; both are
    /// kept exactly as supplied. A
    /// missing or `null` payload becomes an empty object; any other
    /// non-object payload is rejected.
    pub fn parse(
        task_name: Option<&str>,
        payload: Option<serde_json::Value>,
        priority: Option<&str>,
        policy: PriorityPolicy,
    ) -> JobResult<Self> {
        let task_name = task_name.unwrap_or_default();
        let raw_priority = priority.unwrap_or_default();
        if task_name.trim().is_empty() || raw_priority.trim().is_empty() {
            return Err(JobError::invalid_argument("taskName and priority are required"));
        }

        let priority = Priority::parse(raw_priority, policy)?;

        let payload = match payload {
            None | Some(serde_json::Value::Null) => JsonObject::new(),
            Some(serde_json::Value::Object(map)) => map,
            Some(_) => return Err(JobError::invalid_argument("payload must be a JSON object")),
        };

        Ok(Self {
            task_name: task_name.to_string(),
            payload,
            priority,
        })
    }
}

/// A tracked job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub task_name: String,
    pub payload: JsonObject,
    pub priority: Priority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Materialize a freshly inserted job.
    pub fn new(id: JobId, new_job: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            task_name: new_job.task_name,
            payload: new_job.payload,
            priority: new_job.priority,
            status: JobStatus::Pending,
            created_at,
            updated_at: created_at,
            completed_at: None,
        }
    }

    /// Advance the job to `to` at time `at`.
    ///
    /// Rejects anything but the single legal next step and leaves the job
    /// untouched in that case. `updated_at` never moves backwards: an `at`
    /// earlier than the current value is clamped to it.
    pub fn apply_transition(&mut self, to: JobStatus, at: DateTime<Utc>) -> JobResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                id: self.id,
                current: self.status,
                requested: to,
            });
        }

        let at = at.max(self.updated_at);
        self.status = to;
        self.updated_at = at;
        if to == JobStatus::Completed {
            self.completed_at = Some(at);
        }
        Ok(())
    }
}

/// Exact-match filter used when listing jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub priority: Option<Priority>,
}

impl JobFilter {
    pub fn with_status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.status.is_none_or(|s| job.status == s)
            && self.priority.as_ref().is_none_or(|p| &job.priority == p)
    }
}
