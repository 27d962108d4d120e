use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    models::{Category, InteractionEvent, ListKind},
};

use super::{normalize_username, AppState};

#[derive(Debug, Deserialize)]
pub struct RecordInteractionRequest {
    pub list: ListKind,
    pub category: Category,
    pub item_id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Serialize)]
pub struct RecordInteractionResponse {
    pub username: String,
    pub list: ListKind,
    pub inserted: bool,
}

/// Adds an item to a user's watched or liked list
///
/// Recording the same item twice is accepted; the second call reports
/// `inserted: false`.
pub async fn record(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Json(request): Json<RecordInteractionRequest>,
) -> AppResult<(StatusCode, Json<RecordInteractionResponse>)> {
    let username = normalize_username(&username)?;
    let item_id = request.item_id.trim();
    if item_id.is_empty() {
        return Err(AppError::InvalidInput("item_id must not be empty".to_string()));
    }

    let event = InteractionEvent::new(request.category, item_id, request.title);
    let inserted = state
        .repository
        .record_interaction(&username, request.list, event)
        .await?;

    tracing::info!(
        username = %username,
        list = %request.list,
        category = %request.category,
        item_id = %item_id,
        inserted,
        "Interaction recorded"
    );

    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    Ok((
        status,
        Json(RecordInteractionResponse {
            username,
            list: request.list,
            inserted,
        }),
    ))
}
