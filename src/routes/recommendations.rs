use std::collections::HashSet;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{Category, ItemKey, ModelType, Recommendations},
    services::ranker::DEFAULT_LIMIT,
};

use super::{check_limit, normalize_username, AppState};

#[derive(Debug, Deserialize)]
pub struct RecommendationRequest {
    pub username: String,
    pub category: Category,
    #[serde(default)]
    pub exclude: Vec<ItemKey>,
    pub limit: Option<usize>,
    pub model_type: Option<ModelType>,
    /// Also exclude everything the user already watched or liked
    #[serde(default = "default_exclude_own_history")]
    pub exclude_own_history: bool,
}

fn default_exclude_own_history() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub username: String,
    pub category: Category,
    pub model_type: ModelType,
    pub recommendations: Recommendations,
}

/// Handler for recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<RecommendationResponse>> {
    let username = normalize_username(&request.username)?;
    let limit = check_limit(request.limit.unwrap_or(DEFAULT_LIMIT))?;

    let mut exclude: HashSet<ItemKey> = request.exclude.into_iter().collect();
    if request.exclude_own_history {
        if let Some(history) = state.repository.get_interactions(&username).await? {
            exclude.extend(history.item_keys());
        }
    }

    let model_type = request
        .model_type
        .unwrap_or_else(|| state.engine.default_model_type());
    let recommendations = state
        .engine
        .recommend_or_popular(
            &username,
            request.category,
            &exclude,
            limit,
            Some(model_type),
        )
        .await?;

    Ok(Json(RecommendationResponse {
        username,
        category: request.category,
        model_type,
        recommendations,
    }))
}
