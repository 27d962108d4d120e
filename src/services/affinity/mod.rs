/// Affinity models
///
/// Two interchangeable strategies score a (user, item) pair in [0, 1]:
/// - `LatentFactor`: alternating least squares over the binary interaction matrix
/// - `EmbeddingRanker`: embeddings trained with binary cross-entropy
///
/// A `TrainedModel` owns its parameters and the index it was trained on. It is
/// never mutated after training; retraining produces a new value.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ItemKey, ModelType},
    services::aggregator::{Dataset, InteractionIndex},
};

pub mod embedding;
pub mod latent_factor;

pub use embedding::{EmbeddingConfig, EmbeddingRanker};
pub use latent_factor::{LatentFactorConfig, LatentFactors};

/// Score for any pair the model has no parameters for
pub const FALLBACK_SCORE: f32 = 0.0;

/// Hyperparameters for both strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Seed for initialisation, shuffling and sampling
    pub seed: u64,
    pub latent_factor: LatentFactorConfig,
    pub embedding: EmbeddingConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self::with_seed(42)
    }
}

impl TrainingConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            latent_factor: LatentFactorConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

/// Strategy-specific trained parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "snake_case")]
pub enum ModelParams {
    LatentFactor(LatentFactors),
    EmbeddingRanker(EmbeddingRanker),
}

impl ModelParams {
    pub fn model_type(&self) -> ModelType {
        match self {
            ModelParams::LatentFactor(_) => ModelType::LatentFactor,
            ModelParams::EmbeddingRanker(_) => ModelType::EmbeddingRanker,
        }
    }

    fn score(&self, user: usize, item: usize) -> f32 {
        match self {
            ModelParams::LatentFactor(factors) => factors.score(user, item),
            ModelParams::EmbeddingRanker(ranker) => ranker.score(user, item),
        }
    }

    fn shape(&self) -> (usize, usize) {
        match self {
            ModelParams::LatentFactor(factors) => factors.shape(),
            ModelParams::EmbeddingRanker(ranker) => ranker.shape(),
        }
    }
}

/// A trained model bound to the index generation it was trained on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub trained_at: DateTime<Utc>,
    index: InteractionIndex,
    params: ModelParams,
}

impl TrainedModel {
    /// Trains the requested strategy on a dataset
    ///
    /// Deterministic for a given dataset and seed. An empty dataset produces a
    /// model that answers `FALLBACK_SCORE` for every query.
    pub fn train(
        model_type: ModelType,
        dataset: &Dataset,
        config: &TrainingConfig,
    ) -> AppResult<Self> {
        let started = std::time::Instant::now();

        let params = match model_type {
            ModelType::LatentFactor => ModelParams::LatentFactor(LatentFactors::fit(
                dataset,
                &config.latent_factor,
                config.seed,
            )?),
            ModelType::EmbeddingRanker => ModelParams::EmbeddingRanker(EmbeddingRanker::fit(
                dataset,
                &config.embedding,
                config.seed,
            )?),
        };

        tracing::info!(
            model_type = %model_type,
            users = dataset.index.num_users(),
            items = dataset.index.num_items(),
            entries = dataset.entries.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Model trained"
        );

        Ok(Self {
            trained_at: Utc::now(),
            index: dataset.index.clone(),
            params,
        })
    }

    pub fn model_type(&self) -> ModelType {
        self.params.model_type()
    }

    pub fn index(&self) -> &InteractionIndex {
        &self.index
    }

    pub fn generation(&self) -> Uuid {
        self.index.generation()
    }

    pub fn knows_user(&self, user: &str) -> bool {
        self.index.user_position(user).is_some()
    }

    /// Affinity of `user` for `item` in [0, 1]
    ///
    /// Unknown users or items get `FALLBACK_SCORE`.
    pub fn predict(&self, user: &str, item: &ItemKey) -> f32 {
        match (self.index.user_position(user), self.index.item_position(item)) {
            (Some(u), Some(i)) => self.params.score(u, i),
            _ => FALLBACK_SCORE,
        }
    }

    /// Affinity addressed by index positions from a specific generation
    pub fn predict_at(&self, generation: Uuid, user: usize, item: usize) -> AppResult<f32> {
        if generation != self.index.generation() {
            return Err(AppError::IndexMismatch {
                expected: self.index.generation(),
                actual: generation,
            });
        }

        if user >= self.index.num_users() || item >= self.index.num_items() {
            return Ok(FALLBACK_SCORE);
        }

        Ok(self.params.score(user, item))
    }

    /// Checks that the parameter tables match the index they claim to cover
    pub fn validate(&self) -> AppResult<()> {
        let (users, items) = self.params.shape();
        if users != self.index.num_users() || items != self.index.num_items() {
            return Err(AppError::Persistence(format!(
                "{} parameters cover {}x{} but index has {}x{}",
                self.model_type(),
                users,
                items,
                self.index.num_users(),
                self.index.num_items()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::{
        models::{Category, InteractionEvent, ItemKey, ListKind, UserInteractions},
        services::aggregator::{Dataset, DatasetBuilder},
    };

    pub fn movie(id: &str) -> ItemKey {
        ItemKey::new(Category::Movie, id)
    }

    pub fn liked(ids: &[&str]) -> UserInteractions {
        let mut interactions = UserInteractions::new();
        for id in ids {
            interactions.add(ListKind::Liked, InteractionEvent::new(Category::Movie, *id, *id));
        }
        interactions
    }

    /// A liked 1; B liked 1 and 2; movie 3 is known to the catalog only
    pub fn shared_taste_dataset() -> Dataset {
        let mut builder = DatasetBuilder::new();
        builder
            .add_user("A", &liked(&["1"]))
            .add_user("B", &liked(&["1", "2"]))
            .register_item(&movie("3"));
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_empty_dataset_predicts_fallback() {
        for model_type in ModelType::ALL {
            let model =
                TrainedModel::train(model_type, &Dataset::default(), &TrainingConfig::default())
                    .unwrap();
            assert_eq!(model.predict("anyone", &movie("1")), FALLBACK_SCORE);
            assert!(model.validate().is_ok());
        }
    }

    #[test]
    fn test_unknown_user_and_item_predict_fallback() {
        let dataset = shared_taste_dataset();
        for model_type in ModelType::ALL {
            let model = TrainedModel::train(model_type, &dataset, &TrainingConfig::default()).unwrap();
            assert_eq!(model.predict("stranger", &movie("1")), FALLBACK_SCORE);
            assert_eq!(model.predict("A", &movie("999")), FALLBACK_SCORE);
            assert!(!model.knows_user("stranger"));
            assert!(model.knows_user("A"));
        }
    }

    #[test]
    fn test_predictions_in_unit_interval() {
        let dataset = shared_taste_dataset();
        for model_type in ModelType::ALL {
            let model = TrainedModel::train(model_type, &dataset, &TrainingConfig::default()).unwrap();
            for user in ["A", "B"] {
                for id in ["1", "2", "3"] {
                    let score = model.predict(user, &movie(id));
                    assert!((0.0..=1.0).contains(&score), "{model_type} {user} {id} {score}");
                }
            }
        }
    }

    #[test]
    fn test_shared_signal_ranks_above_unseen_item() {
        let dataset = shared_taste_dataset();
        for model_type in ModelType::ALL {
            let model = TrainedModel::train(model_type, &dataset, &TrainingConfig::default()).unwrap();
            let shared = model.predict("A", &movie("2"));
            let unseen = model.predict("A", &movie("3"));
            assert!(shared > unseen, "{model_type}: {shared} <= {unseen}");
        }
    }

    #[test]
    fn test_training_is_deterministic_for_fixed_seed() {
        let dataset = shared_taste_dataset();
        for model_type in ModelType::ALL {
            let first = TrainedModel::train(model_type, &dataset, &TrainingConfig::with_seed(7)).unwrap();
            let second = TrainedModel::train(model_type, &dataset, &TrainingConfig::with_seed(7)).unwrap();
            for id in ["1", "2", "3"] {
                assert_eq!(first.predict("A", &movie(id)), second.predict("A", &movie(id)));
            }
        }
    }

    #[test]
    fn test_predict_at_rejects_other_generation() {
        let dataset = shared_taste_dataset();
        let model =
            TrainedModel::train(ModelType::LatentFactor, &dataset, &TrainingConfig::default()).unwrap();

        let other = shared_taste_dataset();
        let result = model.predict_at(other.index.generation(), 0, 0);
        assert!(matches!(result, Err(AppError::IndexMismatch { .. })));

        let score = model.predict_at(model.generation(), 0, 0).unwrap();
        assert_eq!(score, model.predict("A", &movie("1")));
    }

    #[test]
    fn test_serde_roundtrip_reproduces_predictions() {
        let dataset = shared_taste_dataset();
        for model_type in ModelType::ALL {
            let model = TrainedModel::train(model_type, &dataset, &TrainingConfig::default()).unwrap();
            let json = serde_json::to_string(&model).unwrap();
            let restored: TrainedModel = serde_json::from_str(&json).unwrap();

            assert_eq!(restored.model_type(), model_type);
            assert_eq!(restored.generation(), model.generation());
            for user in ["A", "B"] {
                for id in ["1", "2", "3"] {
                    assert_eq!(restored.predict(user, &movie(id)), model.predict(user, &movie(id)));
                }
            }
        }
    }
}
