use serde::{Deserialize, Serialize};

use jobrelay_core::{JobFilter, JobId, JobStatus, Priority, PriorityPolicy};

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /jobs`. Presence is validated by the engine, not by serde.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub task_name: Option<String>,
    pub payload: Option<serde_json::Value>,
    pub priority: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub priority: Option<String>,
}

impl ListJobsQuery {
    /// Blank parameters are ignored; an unknown status is rejected.
    pub fn into_filter(self) -> Result<JobFilter, axum::response::Response> {
        let mut filter = JobFilter::default();

        if let Some(raw) = self.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let status: JobStatus = raw.parse().map_err(errors::job_error_to_response)?;
            filter = filter.with_status(status);
        }
        if let Some(raw) = self.priority.as_deref().filter(|s| !s.trim().is_empty()) {
            let priority =
                Priority::parse(raw, PriorityPolicy::Loose).map_err(errors::job_error_to_response)?;
            filter = filter.with_priority(priority);
        }
        Ok(filter)
    }
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct RunJobResponse {
    pub message: &'static str,
    pub id: JobId,
    pub status: JobStatus,
}

pub fn parse_job_id(raw: &str) -> Result<JobId, axum::response::Response> {
    raw.parse().map_err(|_| {
        errors::json_error(
            axum::http::StatusCode::BAD_REQUEST,
            "invalid_id",
            "job id must be an integer",
        )
    })
}
