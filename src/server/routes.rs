use crate::server::{handlers, types::AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub fn create_router(state: AppState, max_upload_bytes: usize) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics))
        .route("/predict", post(handlers::predict))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
}
