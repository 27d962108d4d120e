use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{error::AppResult, models::PreferenceWeight};

use super::{normalize_username, AppState};

#[derive(Debug, Serialize)]
pub struct PreferencesResponse {
    pub username: String,
    /// Heaviest genres, the ones to explore the catalog with
    pub top_genres: Vec<String>,
    pub weights: Vec<PreferenceWeight>,
}

/// Handler for weighted genre preferences
pub async fn score(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> AppResult<Json<PreferencesResponse>> {
    let username = normalize_username(&username)?;
    let weights = state.preferences.score_preferences(&username).await?;
    let top_genres = weights
        .iter()
        .take(state.preferences.top_k())
        .map(|w| w.genre.clone())
        .collect();

    Ok(Json(PreferencesResponse {
        username,
        top_genres,
        weights,
    }))
}
