/// Weighted genre preferences
///
/// A training-free fallback: every item a user (or their friends) signalled
/// contributes its genres with a weight depending on the signal source. The
/// top genres are what the caller uses to explore the catalog.
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{
    error::AppResult,
    models::{Category, Exploration, ItemKey, PreferenceWeight},
    services::{
        metadata::{discover_or_empty, genres_or_empty, popular_or_empty, ContentMetadata},
        repository::InteractionRepository,
    },
};

/// Weight per signal source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub liked: f64,
    pub received_recommendation: f64,
    pub watched: f64,
    pub friend_liked: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            liked: 4.0,
            received_recommendation: 3.0,
            watched: 2.0,
            friend_liked: 1.0,
        }
    }
}

/// Random variety added to each weight increment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Jitter {
    Disabled,
    /// Uniform in [0, 1)
    Uniform,
}

/// Genre weights in first-seen order
#[derive(Debug, Default)]
pub struct GenreAccumulator {
    weights: Vec<PreferenceWeight>,
    positions: HashMap<String, usize>,
}

impl GenreAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, genre: &str, weight: f64) {
        match self.positions.get(genre) {
            Some(&position) => self.weights[position].weight += weight,
            None => {
                self.positions.insert(genre.to_string(), self.weights.len());
                self.weights.push(PreferenceWeight {
                    genre: genre.to_string(),
                    weight,
                });
            }
        }
    }

    /// Heaviest first; equal weights keep first-seen order
    pub fn ranked(mut self) -> Vec<PreferenceWeight> {
        self.weights.sort_by(|a, b| b.weight.total_cmp(&a.weight));
        self.weights
    }
}

pub struct PreferenceScorer {
    repository: Arc<dyn InteractionRepository>,
    metadata: Arc<dyn ContentMetadata>,
    weights: SignalWeights,
    jitter: Jitter,
    top_k: usize,
    metadata_timeout: Duration,
}

impl PreferenceScorer {
    pub fn new(
        repository: Arc<dyn InteractionRepository>,
        metadata: Arc<dyn ContentMetadata>,
        jitter: Jitter,
        top_k: usize,
        metadata_timeout: Duration,
    ) -> Self {
        Self {
            repository,
            metadata,
            weights: SignalWeights::default(),
            jitter,
            top_k,
            metadata_timeout,
        }
    }

    pub fn with_weights(mut self, weights: SignalWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Every genre the user's signals touch, heaviest first
    pub async fn score_preferences(&self, username: &str) -> AppResult<Vec<PreferenceWeight>> {
        let signals = self.collect_signals(username).await?;

        let mut genres: HashMap<ItemKey, Vec<String>> = HashMap::new();
        for (key, _) in &signals {
            if !genres.contains_key(key) {
                let names = genres_or_empty(
                    self.metadata.as_ref(),
                    key.category,
                    &key.item_id,
                    self.metadata_timeout,
                )
                .await;
                genres.insert(key.clone(), names);
            }
        }

        let ranked = accumulate(&signals, &genres, self.jitter);

        tracing::info!(
            username = %username,
            signals = signals.len(),
            distinct_items = genres.len(),
            genres = ranked.len(),
            "Scored genre preferences"
        );

        Ok(ranked)
    }

    /// Names of the `top_k` heaviest genres
    pub async fn top_genres(&self, username: &str) -> AppResult<Vec<String>> {
        Ok(self
            .score_preferences(username)
            .await?
            .into_iter()
            .take(self.top_k)
            .map(|w| w.genre)
            .collect())
    }

    /// Catalog items of `category` in the user's top genres
    ///
    /// A user without genre signals gets the popular listing instead.
    pub async fn explore(
        &self,
        username: &str,
        category: Category,
        limit: usize,
    ) -> AppResult<Exploration> {
        let genres = self.top_genres(username).await?;

        let items = if genres.is_empty() {
            popular_or_empty(self.metadata.as_ref(), category, limit, self.metadata_timeout).await
        } else {
            discover_or_empty(
                self.metadata.as_ref(),
                category,
                &genres,
                limit,
                self.metadata_timeout,
            )
            .await
        };

        tracing::info!(
            username = %username,
            category = %category,
            genres = ?genres,
            items = items.len(),
            "Explored catalog by preferred genres"
        );

        Ok(Exploration { genres, items })
    }

    /// (item, weight) pairs from every signal source, in scan order
    async fn collect_signals(&self, username: &str) -> AppResult<Vec<(ItemKey, f64)>> {
        let mut signals = Vec::new();
        let own = self
            .repository
            .get_interactions(username)
            .await?
            .unwrap_or_default();

        for event in &own.liked {
            signals.push((event.key(), self.weights.liked));
        }

        let friends = self.repository.get_friends(username).await?;
        let friend_set: HashSet<&str> = friends.iter().map(String::as_str).collect();

        for rec in self.repository.received_recommendations(username).await? {
            if friend_set.contains(rec.from_user.as_str()) {
                signals.push((rec.key(), self.weights.received_recommendation));
            }
        }

        for event in &own.watched {
            signals.push((event.key(), self.weights.watched));
        }

        for friend in &friends {
            if let Some(theirs) = self.repository.get_interactions(friend).await? {
                for event in &theirs.liked {
                    signals.push((event.key(), self.weights.friend_liked));
                }
            }
        }

        Ok(signals)
    }
}

/// Folds weighted signals into genre weights
fn accumulate(
    signals: &[(ItemKey, f64)],
    genres: &HashMap<ItemKey, Vec<String>>,
    jitter: Jitter,
) -> Vec<PreferenceWeight> {
    let mut rng = rand::thread_rng();
    let mut accumulator = GenreAccumulator::new();

    for (key, weight) in signals {
        for genre in genres.get(key).into_iter().flatten() {
            let increment = match jitter {
                Jitter::Disabled => *weight,
                Jitter::Uniform => *weight + rng.gen::<f64>(),
            };
            accumulator.add(genre, increment);
        }
    }

    accumulator.ranked()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::AppError,
        models::{CatalogItem, InteractionEvent, ListKind, SocialRecommendation},
        services::{metadata::MockContentMetadata, repository::InMemoryRepository},
    };

    fn movie_event(id: &str) -> InteractionEvent {
        InteractionEvent::new(Category::Movie, id, id)
    }

    /// Movie ids map to genres: 1,2 → Horror; 3 → Comedy; 4 → Drama; 5 → Romance
    fn genre_mock() -> MockContentMetadata {
        let mut mock = MockContentMetadata::new();
        mock.expect_get_genres().returning(|_, id| {
            let genre = match id {
                "1" | "2" => "Horror",
                "3" => "Comedy",
                "4" => "Drama",
                "5" => "Romance",
                _ => return Err(AppError::NotFound(id.to_string())),
            };
            Ok(vec![genre.to_string()])
        });
        mock.expect_name().return_const("mock");
        mock
    }

    fn scorer(repo: Arc<InMemoryRepository>, metadata: MockContentMetadata) -> PreferenceScorer {
        PreferenceScorer::new(
            repo,
            Arc::new(metadata),
            Jitter::Disabled,
            3,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_accumulator_ranks_by_weight_then_first_seen() {
        let mut acc = GenreAccumulator::new();
        acc.add("Drama", 1.0);
        acc.add("Action", 2.0);
        acc.add("Comedy", 1.0);
        acc.add("Drama", 1.0);

        let ranked = acc.ranked();
        let names: Vec<&str> = ranked.iter().map(|w| w.genre.as_str()).collect();
        assert_eq!(names, vec!["Drama", "Action", "Comedy"]);
        assert_eq!(ranked[0].weight, 2.0);
    }

    #[test]
    fn test_jitter_stays_within_one_per_increment() {
        let signals = vec![(ItemKey::new(Category::Movie, "1"), 4.0)];
        let genres: HashMap<ItemKey, Vec<String>> =
            [(ItemKey::new(Category::Movie, "1"), vec!["Horror".to_string()])]
                .into_iter()
                .collect();

        for _ in 0..20 {
            let ranked = accumulate(&signals, &genres, Jitter::Uniform);
            assert!(ranked[0].weight >= 4.0 && ranked[0].weight < 5.0);
        }
    }

    #[tokio::test]
    async fn test_liked_horror_outweighs_watched_comedy() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();
        repo.record_interaction("u", ListKind::Liked, movie_event("2")).await.unwrap();
        repo.record_interaction("u", ListKind::Watched, movie_event("3")).await.unwrap();

        let weights = scorer(repo, genre_mock()).score_preferences("u").await.unwrap();

        assert_eq!(
            weights,
            vec![
                PreferenceWeight { genre: "Horror".to_string(), weight: 8.0 },
                PreferenceWeight { genre: "Comedy".to_string(), weight: 2.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_social_signals_weighted() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.add_friendship("u", "friend").await;
        repo.record_interaction("friend", ListKind::Liked, movie_event("5")).await.unwrap();
        repo.send_recommendation(SocialRecommendation::new("friend", "u", Category::Movie, "4", "D"))
            .await;
        // Not a friend: ignored
        repo.send_recommendation(SocialRecommendation::new("stranger", "u", Category::Movie, "3", "C"))
            .await;

        let weights = scorer(repo, genre_mock()).score_preferences("u").await.unwrap();

        assert_eq!(
            weights,
            vec![
                PreferenceWeight { genre: "Drama".to_string(), weight: 3.0 },
                PreferenceWeight { genre: "Romance".to_string(), weight: 1.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_top_genres_truncates() {
        let repo = Arc::new(InMemoryRepository::new());
        for id in ["1", "3", "4", "5"] {
            repo.record_interaction("u", ListKind::Liked, movie_event(id)).await.unwrap();
        }
        repo.record_interaction("u", ListKind::Watched, movie_event("2")).await.unwrap();

        let top = scorer(repo, genre_mock()).top_genres("u").await.unwrap();
        assert_eq!(top, vec!["Horror", "Comedy", "Drama"]);
    }

    #[tokio::test]
    async fn test_metadata_failure_degrades_to_no_genres() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("404")).await.unwrap();
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();

        let weights = scorer(repo, genre_mock()).score_preferences("u").await.unwrap();
        assert_eq!(weights.len(), 1);
        assert_eq!(weights[0].genre, "Horror");
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_preferences() {
        let repo = Arc::new(InMemoryRepository::new());
        let weights = scorer(repo, genre_mock()).score_preferences("ghost").await.unwrap();
        assert!(weights.is_empty());
    }

    #[tokio::test]
    async fn test_genre_lookup_once_per_item() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();
        repo.record_interaction("u", ListKind::Watched, movie_event("1")).await.unwrap();

        let mut mock = MockContentMetadata::new();
        mock.expect_get_genres()
            .times(1)
            .returning(|_, _| Ok(vec!["Horror".to_string()]));
        mock.expect_name().return_const("mock");

        let weights = scorer(repo, mock).score_preferences("u").await.unwrap();
        assert_eq!(weights[0].weight, 6.0);
    }

    #[tokio::test]
    async fn test_configured_weights_replace_defaults() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();
        repo.record_interaction("u", ListKind::Watched, movie_event("3")).await.unwrap();
        repo.record_interaction("u", ListKind::Watched, movie_event("4")).await.unwrap();

        let weights = SignalWeights {
            liked: 1.0,
            received_recommendation: 0.0,
            watched: 5.0,
            friend_liked: 0.0,
        };
        let ranked = scorer(repo, genre_mock())
            .with_weights(weights)
            .score_preferences("u")
            .await
            .unwrap();

        assert_eq!(
            ranked,
            vec![
                PreferenceWeight { genre: "Comedy".to_string(), weight: 5.0 },
                PreferenceWeight { genre: "Drama".to_string(), weight: 5.0 },
                PreferenceWeight { genre: "Horror".to_string(), weight: 1.0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_explore_discovers_by_top_genres() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();
        repo.record_interaction("u", ListKind::Watched, movie_event("3")).await.unwrap();

        let mut mock = genre_mock();
        mock.expect_discover()
            .withf(|category, genres, limit| {
                *category == Category::Movie
                    && genres.len() == 2
                    && genres[0] == "Horror"
                    && genres[1] == "Comedy"
                    && *limit == 5
            })
            .times(1)
            .returning(|category, _, _| {
                Ok(vec![CatalogItem {
                    category,
                    item_id: "9".to_string(),
                    title: "Discovered".to_string(),
                    popularity: None,
                }])
            });
        mock.expect_get_popular().never();

        let exploration = scorer(repo, mock).explore("u", Category::Movie, 5).await.unwrap();

        assert_eq!(exploration.genres, vec!["Horror", "Comedy"]);
        assert_eq!(exploration.items.len(), 1);
        assert_eq!(exploration.items[0].item_id, "9");
    }

    #[tokio::test]
    async fn test_explore_without_signals_falls_back_to_popular() {
        let repo = Arc::new(InMemoryRepository::new());

        let mut mock = genre_mock();
        mock.expect_discover().never();
        mock.expect_get_popular().times(1).returning(|category, _| {
            Ok(vec![CatalogItem {
                category,
                item_id: "100".to_string(),
                title: "Popular".to_string(),
                popularity: Some(10.0),
            }])
        });

        let exploration = scorer(repo, mock).explore("ghost", Category::Show, 5).await.unwrap();

        assert!(exploration.genres.is_empty());
        assert_eq!(exploration.items[0].item_id, "100");
        assert_eq!(exploration.items[0].category, Category::Show);
    }

    #[tokio::test]
    async fn test_explore_survives_discovery_failure() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.record_interaction("u", ListKind::Liked, movie_event("1")).await.unwrap();

        let mut mock = genre_mock();
        mock.expect_discover()
            .returning(|_, _, _| Err(AppError::ExternalApi("503".to_string())));

        let exploration = scorer(repo, mock).explore("u", Category::Movie, 5).await.unwrap();
        assert_eq!(exploration.genres, vec!["Horror"]);
        assert!(exploration.items.is_empty());
    }
}
