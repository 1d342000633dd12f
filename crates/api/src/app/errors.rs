use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use curator_jobs::SubmitError;
use curator_store::JobStoreError;

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

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    match err {
        SubmitError::SourceNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("source collection not found: {id}"),
        ),
        SubmitError::TargetNotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("target collection not found: {id}"),
        ),
        SubmitError::SameCollection => json_error(
            StatusCode::BAD_REQUEST,
            "validation_error",
            "source and target collections must differ",
        ),
        SubmitError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn job_store_error_to_response(err: JobStoreError) -> axum::response::Response {
    match err {
        JobStoreError::NotFound(id) => json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("job not found: {id}"),
        ),
        JobStoreError::AlreadyTerminal { job_id, status } => json_error(
            StatusCode::BAD_REQUEST,
            "conflict",
            format!("job {job_id} is already {}", status.as_str()),
        ),
        JobStoreError::Storage(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}
