use std::sync::Arc;

use crate::services::{
    repository::InteractionRepository, PreferenceScorer, RecommendationEngine,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RecommendationEngine>,
    pub preferences: Arc<PreferenceScorer>,
    pub repository: Arc<dyn InteractionRepository>,
}

impl AppState {
    pub fn new(
        engine: RecommendationEngine,
        preferences: PreferenceScorer,
        repository: Arc<dyn InteractionRepository>,
    ) -> Self {
        Self {
            engine: Arc::new(engine),
            preferences: Arc::new(preferences),
            repository,
        }
    }
}
