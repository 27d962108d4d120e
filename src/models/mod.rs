use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};

pub mod interaction;

pub use interaction::{InteractionEvent, ListKind, SocialRecommendation, UserInteractions};

/// Catalog category of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Movie,
    /// TV show; the external catalog calls this `tv`
    #[serde(alias = "tv")]
    Show,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Show => "show",
        }
    }

    /// Path segment used by the TMDB API
    pub fn tmdb_path(&self) -> &'static str {
        match self {
            Category::Movie => "movie",
            Category::Show => "tv",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "movie" => Ok(Category::Movie),
            "show" | "tv" => Ok(Category::Show),
            other => Err(crate::error::AppError::InvalidInput(format!(
                "Unknown category: {}",
                other
            ))),
        }
    }
}

/// Identity of a catalog item: (category, external id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemKey {
    pub category: Category,
    pub item_id: String,
}

impl ItemKey {
    pub fn new(category: Category, item_id: impl Into<String>) -> Self {
        Self {
            category,
            item_id: item_id.into(),
        }
    }
}

impl Display for ItemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.category, self.item_id)
    }
}

/// Scoring strategy tag; one persisted slot per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelType {
    LatentFactor,
    EmbeddingRanker,
}

impl ModelType {
    pub const ALL: [ModelType; 2] = [ModelType::LatentFactor, ModelType::EmbeddingRanker];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::LatentFactor => "latent_factor",
            ModelType::EmbeddingRanker => "embedding_ranker",
        }
    }
}

impl Display for ModelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latent_factor" | "svd" => Ok(ModelType::LatentFactor),
            "embedding_ranker" | "neural" => Ok(ModelType::EmbeddingRanker),
            other => Err(crate::error::AppError::InvalidInput(format!(
                "Unknown model type: {}",
                other
            ))),
        }
    }
}

/// A ranked candidate, produced per request and never persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    pub category: Category,
    pub item_id: String,
    pub score: f32,
}

/// Accumulated weight for one genre
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceWeight {
    pub genre: String,
    pub weight: f64,
}

/// A catalog entry as reported by the content metadata collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub category: Category,
    pub item_id: String,
    pub title: String,
    pub popularity: Option<f64>,
}

impl CatalogItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.category, self.item_id.clone())
    }
}

/// Catalog items matching a user's heaviest genres
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exploration {
    /// Genres the items were discovered by; empty for a user with no signals
    pub genres: Vec<String>,
    pub items: Vec<CatalogItem>,
}

/// Recommendation output, tagged with where it came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", content = "items", rename_all = "snake_case")]
pub enum Recommendations {
    /// Ranked by a trained affinity model
    Model(Vec<CandidateResult>),
    /// Cold-start fallback to the catalog's popular listing
    Popular(Vec<CatalogItem>),
}

impl Recommendations {
    pub fn len(&self) -> usize {
        match self {
            Recommendations::Model(items) => items.len(),
            Recommendations::Popular(items) => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// TMDB API Types
// ============================================================================

/// Genre entry embedded in TMDB detail and genre list responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmdbGenre {
    pub id: u64,
    pub name: String,
}

/// Response from GET /{movie|tv}/{id}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbDetails {
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
}

/// Response from GET /genre/{movie|tv}/list
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbGenreList {
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
}

/// One result in a TMDB listing; movies carry `title`, shows carry `name`
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbListItem {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub popularity: Option<f64>,
}

/// Response from GET /{movie|tv}/popular and GET /discover/{movie|tv}
#[derive(Debug, Clone, Deserialize)]
pub struct TmdbPage {
    #[serde(default)]
    pub results: Vec<TmdbListItem>,
}

impl TmdbListItem {
    pub fn into_catalog_item(self, category: Category) -> CatalogItem {
        CatalogItem {
            category,
            item_id: self.id.to_string(),
            title: self.title.or(self.name).unwrap_or_default(),
            popularity: self.popularity,
        }
    }
}
