use axum::{
    routing::{get, post},
    Router,
};

pub mod jobs;
pub mod system;

/// Router for the job endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/run-job/:id", post(jobs::run_job))
}
