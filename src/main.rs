use std::sync::Arc;

use affinity_api::{
    config::Config,
    db::{create_pool, create_redis_client, run_migrations, Cache},
    routes::{create_router, AppState},
    services::{
        metadata::{ContentMetadata, TmdbClient},
        repository::{InteractionRepository, PgInteractionRepository},
        ModelStore, PreferenceScorer, RecommendationEngine,
    },
};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "affinity_api=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = Config::from_env()?;

    let pool = create_pool(&config.database_url).await?;
    run_migrations(&pool).await?;

    let (cache, cache_writer) = Cache::new(create_redis_client(&config.redis_url)?).await;

    let repository: Arc<dyn InteractionRepository> = Arc::new(PgInteractionRepository::new(pool));
    let metadata: Arc<dyn ContentMetadata> = Arc::new(TmdbClient::new(
        cache,
        config.tmdb_api_key.clone(),
        config.tmdb_api_url.clone(),
        config.metadata_timeout(),
    )?);

    let engine = RecommendationEngine::new(
        repository.clone(),
        metadata.clone(),
        ModelStore::new(config.model_dir.clone()),
        config.training(),
        config.model_type,
        config.metadata_timeout(),
    );

    match engine.load_model(config.model_type).await {
        Ok(true) => info!(model_type = %config.model_type, "Persisted model installed"),
        Ok(false) => info!(model_type = %config.model_type, "No usable persisted model, first request will train"),
        Err(e) => warn!(model_type = %config.model_type, error = %e, "Persisted model could not be read, first request will retrain"),
    }

    let preferences = PreferenceScorer::new(
        repository.clone(),
        metadata,
        config.jitter(),
        config.top_genres,
        config.metadata_timeout(),
    )
    .with_weights(config.signal_weights());

    let app = create_router(AppState::new(engine, preferences, repository));

    let address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!(address = %address, model_type = %config.model_type, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cache_writer.shutdown().await;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = terminate.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown signal received");
}
