use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobrelay_core::JobError;

pub fn job_error_to_response(err: JobError) -> axum::response::Response {
    match err {
        JobError::InvalidArgument(msg) => json_error(StatusCode::BAD_REQUEST, "validation_error", msg),
        JobError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        JobError::InvalidTransition { current, .. } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "invalid_transition",
                "message": format!("job is already {current}"),
                "status": current,
            })),
        )
            .into_response(),
        JobError::Storage(msg) => {
            tracing::error!(error = %msg, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
        JobError::Notification(msg) => json_error(StatusCode::BAD_GATEWAY, "notification_error", msg),
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
