/// Content metadata collaborator
///
/// Genre names, popular listings and genre discovery come from an external
/// catalog. Lookups are
/// network-fallible and never retried: the helpers below bound each call with a
/// timeout and turn any failure into an empty result, so callers always get a
/// usable (possibly degraded) answer.
use std::time::Duration;

use crate::{
    error::AppResult,
    models::{CatalogItem, Category},
};

pub mod tmdb;

pub use tmdb::TmdbClient;

/// Trait for content metadata providers
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentMetadata: Send + Sync {
    /// Genre names for one catalog item
    async fn get_genres(&self, category: Category, item_id: &str) -> AppResult<Vec<String>>;

    /// Most popular items of a category, best first
    async fn get_popular(&self, category: Category, limit: usize) -> AppResult<Vec<CatalogItem>>;

    /// Items tagged with any of the named genres, most popular first
    ///
    /// Genre names the catalog does not know are ignored; when none is known
    /// the result is empty.
    async fn discover(
        &self,
        category: Category,
        genres: &[String],
        limit: usize,
    ) -> AppResult<Vec<CatalogItem>>;

    /// Provider name for logging and debugging
    fn name(&self) -> &'static str;
}

/// Genres for an item, or an empty list if the lookup fails or times out
pub async fn genres_or_empty(
    metadata: &dyn ContentMetadata,
    category: Category,
    item_id: &str,
    timeout: Duration,
) -> Vec<String> {
    match tokio::time::timeout(timeout, metadata.get_genres(category, item_id)).await {
        Ok(Ok(genres)) => genres,
        Ok(Err(e)) => {
            tracing::warn!(
                provider = metadata.name(),
                category = %category,
                item_id = %item_id,
                error = %e,
                "Genre lookup failed"
            );
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(
                provider = metadata.name(),
                category = %category,
                item_id = %item_id,
                timeout_ms = timeout.as_millis() as u64,
                "Genre lookup timed out"
            );
            Vec::new()
        }
    }
}

/// Popular listing, or an empty list if the lookup fails or times out
pub async fn popular_or_empty(
    metadata: &dyn ContentMetadata,
    category: Category,
    limit: usize,
    timeout: Duration,
) -> Vec<CatalogItem> {
    match tokio::time::timeout(timeout, metadata.get_popular(category, limit)).await {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            tracing::warn!(provider = metadata.name(), category = %category, error = %e, "Popular lookup failed");
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(
                provider = metadata.name(),
                category = %category,
                timeout_ms = timeout.as_millis() as u64,
                "Popular lookup timed out"
            );
            Vec::new()
        }
    }
}

/// Discovery listing, or an empty list if the lookup fails or times out
pub async fn discover_or_empty(
    metadata: &dyn ContentMetadata,
    category: Category,
    genres: &[String],
    limit: usize,
    timeout: Duration,
) -> Vec<CatalogItem> {
    match tokio::time::timeout(timeout, metadata.discover(category, genres, limit)).await {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            tracing::warn!(
                provider = metadata.name(),
                category = %category,
                genres = ?genres,
                error = %e,
                "Genre discovery failed"
            );
            Vec::new()
        }
        Err(_) => {
            tracing::warn!(
                provider = metadata.name(),
                category = %category,
                timeout_ms = timeout.as_millis() as u64,
                "Genre discovery timed out"
            );
            Vec::new()
        }
    }
}
