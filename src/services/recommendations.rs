/// Recommendation engine
///
/// Owns one slot per model type. A slot holds the installed model (shared,
/// immutable) and a training lock so that concurrent requests against an empty
/// slot train once. Training runs on the blocking pool.
use std::{collections::HashSet, path::PathBuf, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{CandidateResult, Category, ItemKey, ModelType, Recommendations},
    services::{
        affinity::{TrainedModel, TrainingConfig},
        aggregator::build_dataset,
        metadata::{popular_or_empty, ContentMetadata},
        model_store::ModelStore,
        ranker::rank_candidates,
        repository::InteractionRepository,
    },
};

/// Outcome of a training pass
#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub model_type: ModelType,
    pub generation: Uuid,
    pub trained_at: DateTime<Utc>,
    pub users: usize,
    pub items: usize,
    pub entries: usize,
    pub persisted: bool,
}

#[derive(Default)]
struct ModelSlot {
    model: RwLock<Option<Arc<TrainedModel>>>,
    train_lock: Mutex<()>,
}

impl ModelSlot {
    async fn installed(&self) -> Option<Arc<TrainedModel>> {
        self.model.read().await.clone()
    }

    async fn install(&self, model: Arc<TrainedModel>) {
        *self.model.write().await = Some(model);
    }
}

pub struct RecommendationEngine {
    repository: Arc<dyn InteractionRepository>,
    metadata: Arc<dyn ContentMetadata>,
    store: ModelStore,
    training: TrainingConfig,
    default_model: ModelType,
    metadata_timeout: Duration,
    latent_factor: ModelSlot,
    embedding_ranker: ModelSlot,
}

impl RecommendationEngine {
    pub fn new(
        repository: Arc<dyn InteractionRepository>,
        metadata: Arc<dyn ContentMetadata>,
        store: ModelStore,
        training: TrainingConfig,
        default_model: ModelType,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            metadata,
            store,
            training,
            default_model,
            metadata_timeout,
            latent_factor: ModelSlot::default(),
            embedding_ranker: ModelSlot::default(),
        }
    }

    pub fn default_model_type(&self) -> ModelType {
        self.default_model
    }

    fn slot(&self, model_type: ModelType) -> &ModelSlot {
        match model_type {
            ModelType::LatentFactor => &self.latent_factor,
            ModelType::EmbeddingRanker => &self.embedding_ranker,
        }
    }

    /// The installed model of a type, without training or loading
    pub async fn current_model(&self, model_type: ModelType) -> Option<Arc<TrainedModel>> {
        self.slot(model_type).installed().await
    }

    /// Retrains `model_type` on the current repository contents
    ///
    /// The new model replaces the installed one and is persisted. A failed
    /// write leaves the new model installed and is reported in the summary.
    pub async fn train(&self, model_type: ModelType) -> AppResult<TrainingSummary> {
        let slot = self.slot(model_type);
        let _guard = slot.train_lock.lock().await;
        self.train_locked(model_type, slot).await
    }

    /// Caller must hold the slot's training lock
    async fn train_locked(&self, model_type: ModelType, slot: &ModelSlot) -> AppResult<TrainingSummary> {
        let dataset = build_dataset(self.repository.as_ref()).await?;
        let entries = dataset.entries.len();
        let config = self.training.clone();

        let model = tokio::task::spawn_blocking(move || {
            TrainedModel::train(model_type, &dataset, &config)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Training task failed: {}", e)))??;
        let model = Arc::new(model);

        slot.install(model.clone()).await;

        let persisted = match self.persist(model_type, model.clone()).await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(model_type = %model_type, error = %e, "Trained model not persisted");
                false
            }
        };

        Ok(TrainingSummary {
            model_type,
            generation: model.generation(),
            trained_at: model.trained_at,
            users: model.index().num_users(),
            items: model.index().num_items(),
            entries,
            persisted,
        })
    }

    async fn persist(&self, model_type: ModelType, model: Arc<TrainedModel>) -> AppResult<PathBuf> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.save(model_type, &model))
            .await
            .map_err(|e| AppError::Internal(format!("Save task failed: {}", e)))?
    }

    async fn restore(&self, model_type: ModelType) -> AppResult<Option<TrainedModel>> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.load(model_type))
            .await
            .map_err(|e| AppError::Internal(format!("Load task failed: {}", e)))?
    }

    /// Installed model, else the persisted one, else a freshly trained one
    async fn ensure_model(&self, model_type: ModelType) -> AppResult<Arc<TrainedModel>> {
        let slot = self.slot(model_type);
        if let Some(model) = slot.installed().await {
            return Ok(model);
        }

        let _guard = slot.train_lock.lock().await;
        // Another request may have finished while we waited
        if let Some(model) = slot.installed().await {
            return Ok(model);
        }

        match self.restore(model_type).await {
            Ok(Some(model)) => {
                let model = Arc::new(model);
                slot.install(model.clone()).await;
                return Ok(model);
            }
            Ok(None) => {
                tracing::info!(model_type = %model_type, "No model available, training on demand");
            }
            Err(AppError::Persistence(reason)) => {
                tracing::warn!(
                    model_type = %model_type,
                    reason = %reason,
                    "Persisted model is corrupt, retraining"
                );
            }
            Err(e) => return Err(e),
        }

        self.train_locked(model_type, slot).await?;
        slot.installed()
            .await
            .ok_or_else(|| AppError::Internal(format!("{} model missing after training", model_type)))
    }

    /// Ranked candidates of `category` for `user`
    ///
    /// Nothing in `exclude` is ever returned. Unknown users get every
    /// candidate at the fallback score.
    pub async fn recommend(
        &self,
        user: &str,
        category: Category,
        exclude: &HashSet<ItemKey>,
        limit: usize,
        model_type: Option<ModelType>,
    ) -> AppResult<Vec<CandidateResult>> {
        let model = self.ensure_model(model_type.unwrap_or(self.default_model)).await?;
        Ok(rank_candidates(&model, user, category, exclude, limit))
    }

    /// Like `recommend`, but users the model has never seen get the
    /// collaborator's popular listing instead of uniform scores
    pub async fn recommend_or_popular(
        &self,
        user: &str,
        category: Category,
        exclude: &HashSet<ItemKey>,
        limit: usize,
        model_type: Option<ModelType>,
    ) -> AppResult<Recommendations> {
        let model = self.ensure_model(model_type.unwrap_or(self.default_model)).await?;

        if model.knows_user(user) {
            return Ok(Recommendations::Model(rank_candidates(
                &model, user, category, exclude, limit,
            )));
        }

        tracing::info!(user = %user, category = %category, "Cold start, serving popular items");

        // Over-fetch so excluded items do not shrink the page
        let popular = popular_or_empty(
            self.metadata.as_ref(),
            category,
            limit + exclude.len(),
            self.metadata_timeout,
        )
        .await;

        Ok(Recommendations::Popular(
            popular
                .into_iter()
                .filter(|item| !exclude.contains(&item.key()))
                .take(limit)
                .collect(),
        ))
    }

    /// Persists the installed model of a type
    pub async fn save_model(&self, model_type: ModelType) -> AppResult<PathBuf> {
        let model = self
            .current_model(model_type)
            .await
            .ok_or_else(|| AppError::NotFound(format!("No {} model is installed", model_type)))?;
        self.persist(model_type, model).await
    }

    /// Installs the persisted model of a type
    ///
    /// `false` if nothing usable is persisted: the file is missing, or it is
    /// corrupt and left for the next training run to overwrite. The installed
    /// model, if any, is kept in both cases.
    pub async fn load_model(&self, model_type: ModelType) -> AppResult<bool> {
        let slot = self.slot(model_type);
        let _guard = slot.train_lock.lock().await;

        match self.restore(model_type).await {
            Ok(Some(model)) => {
                slot.install(Arc::new(model)).await;
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(AppError::Persistence(reason)) => {
                tracing::warn!(
                    model_type = %model_type,
                    reason = %reason,
                    "Persisted model unusable, not loaded"
                );
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
