/// Offline training: builds the dataset from PostgreSQL, trains, and writes
/// the model file the server loads at startup.
///
/// Usage: `train_model [latent_factor|embedding_ranker|all]`, defaulting to
/// the configured `MODEL_TYPE`.
use affinity_api::{
    config::Config,
    db::{create_pool, run_migrations},
    models::ModelType,
    services::{aggregator::build_dataset, repository::PgInteractionRepository, ModelStore, TrainedModel},
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("affinity_api=info")))
        .init();

    let config = Config::from_env()?;
    let model_types = match std::env::args().nth(1).as_deref() {
        None => vec![config.model_type],
        Some("all") => ModelType::ALL.to_vec(),
        Some(name) => vec![name.parse::<ModelType>()?],
    };

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let repository = PgInteractionRepository::new(pool);
    let dataset = build_dataset(&repository).await?;
    let store = ModelStore::new(config.model_dir.clone());
    let training = config.training();

    for model_type in model_types {
        let model = TrainedModel::train(model_type, &dataset, &training)?;
        let path = store.save(model_type, &model)?;
        info!(
            model_type = %model_type,
            path = %path.display(),
            generation = %model.generation(),
            "Training complete"
        );
    }

    Ok(())
}
