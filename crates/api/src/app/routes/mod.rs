use axum::{
    Router,
    routing::{get, post},
};

pub mod collections;
pub mod jobs;
pub mod system;

/// Router for all application endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs/bulk-move", post(jobs::submit))
        .route("/jobs/:id", get(jobs::status))
        .route("/jobs/:id/cancel", post(jobs::cancel))
        .route("/collections/:id/count", get(collections::count))
}
