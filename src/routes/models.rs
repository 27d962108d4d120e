use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::{
    error::AppResult,
    models::ModelType,
    services::TrainingSummary,
};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub model_type: ModelType,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct LoadResponse {
    pub model_type: ModelType,
    pub loaded: bool,
}

/// Retrains a model on the current interactions
pub async fn train(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
) -> AppResult<Json<TrainingSummary>> {
    let model_type: ModelType = model_type.parse()?;
    Ok(Json(state.engine.train(model_type).await?))
}

pub async fn save(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
) -> AppResult<Json<SaveResponse>> {
    let model_type: ModelType = model_type.parse()?;
    let path = state.engine.save_model(model_type).await?;
    Ok(Json(SaveResponse {
        model_type,
        path: path.display().to_string(),
    }))
}

pub async fn load(
    State(state): State<AppState>,
    Path(model_type): Path<String>,
) -> AppResult<Json<LoadResponse>> {
    let model_type: ModelType = model_type.parse()?;
    let loaded = state.engine.load_model(model_type).await?;
    Ok(Json(LoadResponse { model_type, loaded }))
}
