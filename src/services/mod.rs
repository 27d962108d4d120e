pub mod affinity;
pub mod aggregator;
pub mod metadata;
pub mod model_store;
pub mod preferences;
pub mod ranker;
pub mod recommendations;
pub mod repository;

pub use affinity::{TrainedModel, TrainingConfig};
pub use model_store::ModelStore;
pub use preferences::{Jitter, PreferenceScorer};
pub use recommendations::{RecommendationEngine, TrainingSummary};
