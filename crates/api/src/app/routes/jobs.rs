use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use curator_core::JobId;
use curator_store::JobStore;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub async fn submit(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<dto::BulkMoveRequest>,
) -> axum::response::Response {
    let request = match dto::parse_bulk_move(body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let submitted = match services.dispatcher.submit(request).await {
        Ok(s) => s,
        Err(e) => return errors::submit_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "job_id": submitted.job.id,
            "status": submitted.job.status.as_str(),
            "estimated_total": submitted.job.total_items,
            "created_at": submitted.job.created_at,
        })),
    )
        .into_response()
}

pub async fn status(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id");
        }
    };

    let job = match services.jobs.get(job_id) {
        Ok(Some(job)) => job,
        Ok(None) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                "not_found",
                format!("job not found: {job_id}"),
            );
        }
        Err(e) => return errors::job_store_error_to_response(e),
    };

    (StatusCode::OK, Json(dto::job_status_json(&job))).into_response()
}

pub async fn cancel(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let job_id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid job id");
        }
    };

    if let Err(e) = services.jobs.request_cancel(job_id) {
        return errors::job_store_error_to_response(e);
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "cancellation requested",
            "job_id": job_id,
        })),
    )
        .into_response()
}
