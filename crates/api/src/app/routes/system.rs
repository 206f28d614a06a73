use axum::{extract::Extension, http::StatusCode, Json};

use jobrelay_infra::jobs::{EngineStats, JobEngine};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn stats(Extension(engine): Extension<JobEngine>) -> Json<EngineStats> {
    Json(engine.stats())
}
