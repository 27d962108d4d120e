/// TMDB content metadata provider
///
/// API Flow:
/// 1. Genres: /{movie|tv}/{id} → `genres[].name`
/// 2. Popular: /{movie|tv}/popular → first page of results
/// 3. Discover: /genre/{movie|tv}/list maps names to ids, then
///    /discover/{movie|tv}?with_genres=<ids> → first page of results
///
/// Every response is cached in Redis; genres change rarely, listings daily.
use std::time::Duration;

use reqwest::Client as HttpClient;

use crate::{
    cached,
    db::{Cache, CacheKey},
    error::{AppError, AppResult},
    models::{CatalogItem, Category, ItemKey, TmdbDetails, TmdbGenre, TmdbGenreList, TmdbPage},
    services::metadata::ContentMetadata,
};

const GENRE_CACHE_TTL: u64 = 604800; // 1 week
const POPULAR_CACHE_TTL: u64 = 86400; // 1 day

/// TMDB reads `|` in `with_genres` as "any of"
const GENRE_ID_SEPARATOR: &str = "|";

#[derive(Clone)]
pub struct TmdbClient {
    http_client: HttpClient,
    api_key: String,
    api_url: String,
    cache: Cache,
}

impl TmdbClient {
    /// Creates a client whose requests are bounded by `timeout`
    pub fn new(cache: Cache, api_key: String, api_url: String, timeout: Duration) -> AppResult<Self> {
        let http_client = HttpClient::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_key,
            api_url: api_url.trim_end_matches('/').to_string(),
            cache,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> AppResult<T> {
        let url = format!("{}/{}", self.api_url, path);

        let response = self
            .http_client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalApi(format!(
                "TMDB API returned status {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Genre id table for a category
    async fn genre_list(&self, category: Category) -> AppResult<Vec<TmdbGenre>> {
        cached!(
            self.cache,
            CacheKey::GenreList(category),
            GENRE_CACHE_TTL,
            async move {
                let list: TmdbGenreList = self
                    .get_json(&format!("genre/{}/list", category.tmdb_path()), &[])
                    .await?;
                Ok::<_, AppError>(list.genres)
            }
        )
    }
}

/// Ids of the named genres, in the order named; unknown names are skipped
fn resolve_genre_ids(known: &[TmdbGenre], names: &[String]) -> Vec<u64> {
    let mut ids: Vec<u64> = Vec::new();
    for name in names {
        if let Some(genre) = known.iter().find(|g| g.name.eq_ignore_ascii_case(name.trim())) {
            if !ids.contains(&genre.id) {
                ids.push(genre.id);
            }
        }
    }
    ids
}

#[async_trait::async_trait]
impl ContentMetadata for TmdbClient {
    async fn get_genres(&self, category: Category, item_id: &str) -> AppResult<Vec<String>> {
        if item_id.trim().is_empty() {
            return Err(AppError::InvalidInput("Item id cannot be empty".to_string()));
        }

        cached!(
            self.cache,
            CacheKey::Genres(ItemKey::new(category, item_id)),
            GENRE_CACHE_TTL,
            async move {
                let details: TmdbDetails = self
                    .get_json(&format!("{}/{}", category.tmdb_path(), item_id), &[])
                    .await?;

                let genres: Vec<String> = details.genres.into_iter().map(|g| g.name).collect();

                tracing::debug!(
                    category = %category,
                    item_id = %item_id,
                    genres = genres.len(),
                    provider = "tmdb",
                    "Genre lookup completed"
                );

                Ok::<_, AppError>(genres)
            }
        )
    }

    async fn get_popular(&self, category: Category, limit: usize) -> AppResult<Vec<CatalogItem>> {
        let listing: AppResult<Vec<CatalogItem>> = cached!(
            self.cache,
            CacheKey::Popular(category),
            POPULAR_CACHE_TTL,
            async move {
                let page: TmdbPage = self
                    .get_json(&format!("{}/popular", category.tmdb_path()), &[])
                    .await?;

                let items: Vec<CatalogItem> = page
                    .results
                    .into_iter()
                    .map(|item| item.into_catalog_item(category))
                    .collect();

                tracing::info!(
                    category = %category,
                    results = items.len(),
                    provider = "tmdb",
                    "Popular listing fetched"
                );

                Ok::<_, AppError>(items)
            }
        );

        Ok(listing?.into_iter().take(limit).collect())
    }

    async fn discover(
        &self,
        category: Category,
        genres: &[String],
        limit: usize,
    ) -> AppResult<Vec<CatalogItem>> {
        let known = self.genre_list(category).await?;
        let ids = resolve_genre_ids(&known, genres);
        if ids.is_empty() {
            tracing::debug!(
                category = %category,
                genres = ?genres,
                provider = "tmdb",
                "No known genres to discover by"
            );
            return Ok(Vec::new());
        }

        let with_genres = ids
            .iter()
            .map(u64::to_string)
            .collect::<Vec<_>>()
            .join(GENRE_ID_SEPARATOR);

        let listing: AppResult<Vec<CatalogItem>> = cached!(
            self.cache,
            CacheKey::Discover(category, with_genres.clone()),
            POPULAR_CACHE_TTL,
            async move {
                let page: TmdbPage = self
                    .get_json(
                        &format!("discover/{}", category.tmdb_path()),
                        &[
                            ("with_genres", with_genres.as_str()),
                            ("sort_by", "popularity.desc"),
                        ],
                    )
                    .await?;

                let items: Vec<CatalogItem> = page
                    .results
                    .into_iter()
                    .map(|item| item.into_catalog_item(category))
                    .collect();

                tracing::info!(
                    category = %category,
                    with_genres = %with_genres,
                    results = items.len(),
                    provider = "tmdb",
                    "Discovery listing fetched"
                );

                Ok::<_, AppError>(items)
            }
        );

        Ok(listing?.into_iter().take(limit).collect())
    }

    fn name(&self) -> &'static str {
        "tmdb"
    }
}
