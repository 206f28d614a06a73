use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Extension, Path, Query,
    },
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use jobrelay_infra::jobs::JobEngine;

use crate::app::{dto, errors};

pub async fn create_job(
    Extension(engine): Extension<JobEngine>,
    body: Result<Json<dto::CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()),
    };

    match engine
        .create_job(body.task_name.as_deref(), body.payload, body.priority.as_deref())
        .await
    {
        Ok(job) => (StatusCode::CREATED, Json(job)).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(engine): Extension<JobEngine>,
    query: Result<Query<dto::ListJobsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", e.body_text()),
    };
    let filter = match query.into_filter() {
        Ok(f) => f,
        Err(resp) => return resp,
    };

    match engine.list_jobs(&filter).await {
        Ok(jobs) => Json(jobs).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(engine): Extension<JobEngine>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.get_job(id).await {
        Ok(job) => Json(job).into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}

/// Start a pending job. Responds once the job is `running`; completion happens later.
pub async fn run_job(
    Extension(engine): Extension<JobEngine>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match dto::parse_job_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match engine.start_job(id).await {
        Ok(job) => Json(dto::RunJobResponse {
            message: "Job started",
            id: job.id,
            status: job.status,
        })
        .into_response(),
        Err(e) => errors::job_error_to_response(e),
    }
}
