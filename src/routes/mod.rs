use axum::{
    http::StatusCode,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    error::{AppError, AppResult},
    middleware::{make_span_with_request_id, request_id_middleware},
};

pub mod explore;
pub mod interactions;
pub mod models;
pub mod preferences;
pub mod recommendations;
pub mod state;

pub use state::AppState;

/// Largest page a listing endpoint serves
const MAX_LIMIT: usize = 100;

/// Creates the application router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api_routes())
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id_middleware))
                .layer(TraceLayer::new_for_http().make_span_with(make_span_with_request_id))
                .layer(CorsLayer::permissive()),
        )
}

/// API routes under /api/v1
fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:username/interactions", post(interactions::record))
        .route("/users/:username/preferences", get(preferences::score))
        .route("/users/:username/explore", get(explore::explore))
        .route("/recommendations", post(recommendations::recommend))
        .route("/models/:model_type/train", post(models::train))
        .route("/models/:model_type/save", post(models::save))
        .route("/models/:model_type/load", post(models::load))
}

/// Health check endpoint
async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

/// Usernames are compared trimmed; a blank one is rejected
pub(crate) fn normalize_username(raw: &str) -> AppResult<String> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(AppError::InvalidInput("username must not be empty".to_string()));
    }
    Ok(username.to_string())
}

pub(crate) fn check_limit(limit: usize) -> AppResult<usize> {
    if limit > MAX_LIMIT {
        return Err(AppError::InvalidInput(format!(
            "limit must be at most {}",
            MAX_LIMIT
        )));
    }
    Ok(limit)
}
