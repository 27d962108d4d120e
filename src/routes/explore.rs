use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{Category, Exploration},
    services::ranker::DEFAULT_LIMIT,
};

use super::{check_limit, normalize_username, AppState};

#[derive(Debug, Deserialize)]
pub struct ExploreQuery {
    pub category: Category,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ExploreResponse {
    pub username: String,
    pub category: Category,
    #[serde(flatten)]
    pub exploration: Exploration,
}

/// Catalog items in the user's heaviest genres
pub async fn explore(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<ExploreQuery>,
) -> AppResult<Json<ExploreResponse>> {
    let username = normalize_username(&username)?;
    let limit = check_limit(query.limit.unwrap_or(DEFAULT_LIMIT))?;

    let exploration = state
        .preferences
        .explore(&username, query.category, limit)
        .await?;

    Ok(Json(ExploreResponse {
        username,
        category: query.category,
        exploration,
    }))
}
