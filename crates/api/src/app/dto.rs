//! Request DTOs and JSON mapping helpers.

use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::{Value, json};

use curator_core::{CollectionId, CompanyId, Job, Selection};
use curator_jobs::SubmitRequest;

use crate::app::errors;

#[derive(Debug, Deserialize)]
pub struct BulkMoveRequest {
    pub source_collection_id: String,
    pub target_collection_id: String,
    pub selection_kind: String,
    #[serde(default)]
    pub selection_data: Option<Value>,
    #[serde(default)]
    pub client_idempotency_key: Option<String>,
}

/// Validate the wire payload into a domain submission.
pub fn parse_bulk_move(body: BulkMoveRequest) -> Result<SubmitRequest, axum::response::Response> {
    let source_collection_id = parse_collection_id(&body.source_collection_id, "source_collection_id")?;
    let target_collection_id = parse_collection_id(&body.target_collection_id, "target_collection_id")?;
    let selection = parse_selection(&body.selection_kind, body.selection_data)?;

    Ok(SubmitRequest {
        source_collection_id,
        target_collection_id,
        selection,
        idempotency_key: body.client_idempotency_key,
    })
}

fn validation_error(message: impl Into<String>) -> axum::response::Response {
    errors::json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

fn parse_collection_id(
    raw: &str,
    field: &str,
) -> Result<CollectionId, axum::response::Response> {
    raw.parse()
        .map_err(|_| validation_error(format!("{field} must be a uuid")))
}

fn parse_selection(
    kind: &str,
    data: Option<Value>,
) -> Result<Selection, axum::response::Response> {
    match kind {
        "explicit" => {
            let data = data
                .ok_or_else(|| validation_error("selection_data is required for explicit selections"))?;
            let ids = data
                .get("ids")
                .and_then(Value::as_array)
                .ok_or_else(|| validation_error("selection_data.ids must be an array"))?;
            let ids = ids
                .iter()
                .map(|v| v.as_i64().map(CompanyId))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| validation_error("selection_data.ids must contain integer company ids"))?;
            Ok(Selection::Explicit { ids })
        }
        "all_matching" => {
            let data = data.unwrap_or(Value::Null);
            let filter = data.get("filter").filter(|v| !v.is_null()).cloned();
            let snapshot_total = data.get("total_at_snapshot").and_then(Value::as_u64);
            Ok(Selection::AllMatching {
                filter,
                snapshot_total,
            })
        }
        other => Err(validation_error(format!("unknown selection_kind: {other}"))),
    }
}

/// Status payload shared by submission and status reads.
pub fn job_status_json(job: &Job) -> Value {
    json!({
        "job_id": job.id,
        "status": job.status.as_str(),
        "total_items": job.total_items,
        "processed_items": job.counters.processed,
        "added_items": job.counters.added,
        "skipped_items": job.counters.skipped,
        "failed_items": job.counters.failed,
        "progress_pct": job.progress_pct(),
        "error_message": job.error_message,
    })
}
