//! Route modules for the File Transfer Server

pub mod health;
pub mod transfer;

use axum::{extract::DefaultBodyLimit, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Headroom over the file size for multipart framing and the `fileName` part
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state
        .transfer()
        .max_upload_size()
        .saturating_add(MULTIPART_OVERHEAD);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/file-transfer", transfer::router())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
