use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};

use curator_core::CollectionId;
use curator_store::{CollectionStore, MembershipStore};

use crate::app::errors;
use crate::app::services::AppServices;

/// Membership count for one collection; the preflight clients use before
/// submitting a large move.
pub async fn count(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let collection_id: CollectionId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid collection id",
            );
        }
    };

    let Some(collection) = services.collections.get(collection_id) else {
        return errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("collection not found: {collection_id}"),
        );
    };

    let count = match services.memberships.count(collection_id) {
        Ok(n) => n,
        Err(e) => {
            return errors::json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                e.to_string(),
            );
        }
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "count": count,
            "collection_id": collection_id,
            "collection_name": collection.name,
        })),
    )
        .into_response()
}
