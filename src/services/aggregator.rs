/// Interaction aggregation
///
/// Turns per-user watched/liked lists into a dense index and a list of implicit
/// feedback entries. The index is an arena of two tables (users, items) with
/// lookup maps; every build gets a fresh generation id so a model can tell
/// whether index positions handed to it were produced by the index it was
/// trained on.
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{ItemKey, UserInteractions},
    services::repository::InteractionRepository,
};

/// Implicit-feedback rating; every observed interaction counts the same
pub const IMPLICIT_RATING: f32 = 1.0;

/// One observed (user, item) pair
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeedbackEntry {
    pub user: usize,
    pub item: usize,
    pub rating: f32,
}

/// Serialized form of the index: the two tables only
#[derive(Serialize, Deserialize)]
struct IndexTables {
    generation: Uuid,
    users: Vec<String>,
    items: Vec<ItemKey>,
}

/// Bijective user/item ↔ position mapping for one index generation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "IndexTables", into = "IndexTables")]
pub struct InteractionIndex {
    generation: Uuid,
    users: Vec<String>,
    items: Vec<ItemKey>,
    user_lookup: HashMap<String, usize>,
    item_lookup: HashMap<ItemKey, usize>,
}

impl TryFrom<IndexTables> for InteractionIndex {
    type Error = AppError;

    fn try_from(tables: IndexTables) -> Result<Self, Self::Error> {
        let mut user_lookup = HashMap::with_capacity(tables.users.len());
        for (position, user) in tables.users.iter().enumerate() {
            if user_lookup.insert(user.clone(), position).is_some() {
                return Err(AppError::Persistence(format!(
                    "Duplicate user in index: {}",
                    user
                )));
            }
        }

        let mut item_lookup = HashMap::with_capacity(tables.items.len());
        for (position, item) in tables.items.iter().enumerate() {
            if item_lookup.insert(item.clone(), position).is_some() {
                return Err(AppError::Persistence(format!(
                    "Duplicate item in index: {}",
                    item
                )));
            }
        }

        Ok(Self {
            generation: tables.generation,
            users: tables.users,
            items: tables.items,
            user_lookup,
            item_lookup,
        })
    }
}

impl From<InteractionIndex> for IndexTables {
    fn from(index: InteractionIndex) -> Self {
        Self {
            generation: index.generation,
            users: index.users,
            items: index.items,
        }
    }
}

impl Default for InteractionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionIndex {
    pub fn new() -> Self {
        Self {
            generation: Uuid::new_v4(),
            users: Vec::new(),
            items: Vec::new(),
            user_lookup: HashMap::new(),
            item_lookup: HashMap::new(),
        }
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// Position of a user, assigning the next one on first sight
    fn intern_user(&mut self, user: &str) -> usize {
        if let Some(&position) = self.user_lookup.get(user) {
            return position;
        }
        let position = self.users.len();
        self.users.push(user.to_string());
        self.user_lookup.insert(user.to_string(), position);
        position
    }

    /// Position of an item, assigning the next one on first sight
    fn intern_item(&mut self, item: &ItemKey) -> usize {
        if let Some(&position) = self.item_lookup.get(item) {
            return position;
        }
        let position = self.items.len();
        self.items.push(item.clone());
        self.item_lookup.insert(item.clone(), position);
        position
    }

    pub fn user_position(&self, user: &str) -> Option<usize> {
        self.user_lookup.get(user).copied()
    }

    pub fn item_position(&self, item: &ItemKey) -> Option<usize> {
        self.item_lookup.get(item).copied()
    }

    pub fn user_at(&self, position: usize) -> Option<&str> {
        self.users.get(position).map(String::as_str)
    }

    /// Items in index order
    pub fn items(&self) -> &[ItemKey] {
        &self.items
    }

    pub fn num_users(&self) -> usize {
        self.users.len()
    }

    pub fn num_items(&self) -> usize {
        self.items.len()
    }
}

/// Index plus the feedback entries addressed by it
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub index: InteractionIndex,
    pub entries: Vec<FeedbackEntry>,
}

impl Dataset {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Observed item positions per user position
    pub fn items_by_user(&self) -> Vec<Vec<usize>> {
        let mut grouped = vec![Vec::new(); self.index.num_users()];
        for entry in &self.entries {
            grouped[entry.user].push(entry.item);
        }
        grouped
    }

    /// Observed user positions per item position
    pub fn users_by_item(&self) -> Vec<Vec<usize>> {
        let mut grouped = vec![Vec::new(); self.index.num_items()];
        for entry in &self.entries {
            grouped[entry.item].push(entry.user);
        }
        grouped
    }
}

/// Incremental dataset construction in first-seen order
#[derive(Default)]
pub struct DatasetBuilder {
    index: InteractionIndex,
    entries: Vec<FeedbackEntry>,
    seen: HashSet<(usize, usize)>,
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user's watched then liked items
    ///
    /// An item present on both lists yields a single entry. Users without
    /// any events are left out of the index.
    pub fn add_user(&mut self, user: &str, interactions: &UserInteractions) -> &mut Self {
        if interactions.is_empty() {
            return self;
        }

        let user_position = self.index.intern_user(user);
        for event in interactions.watched.iter().chain(interactions.liked.iter()) {
            let item_position = self.index.intern_item(&event.key());
            if self.seen.insert((user_position, item_position)) {
                self.entries.push(FeedbackEntry {
                    user: user_position,
                    item: item_position,
                    rating: IMPLICIT_RATING,
                });
            }
        }
        self
    }

    /// Makes an item rankable without any feedback for it
    pub fn register_item(&mut self, item: &ItemKey) -> &mut Self {
        self.index.intern_item(item);
        self
    }

    pub fn build(self) -> Dataset {
        Dataset {
            index: self.index,
            entries: self.entries,
        }
    }
}

/// Pulls every user's interactions from the repository and builds the dataset
///
/// Users the repository has no entry for are skipped.
pub async fn build_dataset(repository: &dyn InteractionRepository) -> AppResult<Dataset> {
    let users = repository.list_users().await?;
    let mut builder = DatasetBuilder::new();
    let mut skipped = 0usize;

    for user in &users {
        match repository.get_interactions(user).await? {
            Some(interactions) => {
                builder.add_user(user, &interactions);
            }
            None => skipped += 1,
        }
    }

    for item in repository.list_catalog_items().await? {
        builder.register_item(&item);
    }

    let dataset = builder.build();

    tracing::info!(
        repository = repository.name(),
        users = dataset.index.num_users(),
        items = dataset.index.num_items(),
        entries = dataset.entries.len(),
        skipped_users = skipped,
        generation = %dataset.index.generation(),
        "Built implicit feedback dataset"
    );

    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Category, InteractionEvent, ListKind},
        services::repository::InMemoryRepository,
    };

    fn interactions(watched: &[&str], liked: &[&str]) -> UserInteractions {
        let mut result = UserInteractions::new();
        for id in watched {
            result.add(ListKind::Watched, InteractionEvent::new(Category::Movie, *id, *id));
        }
        for id in liked {
            result.add(ListKind::Liked, InteractionEvent::new(Category::Movie, *id, *id));
        }
        result
    }

    #[test]
    fn test_watched_and_liked_same_item_collapse() {
        let mut builder = DatasetBuilder::new();
        builder.add_user("alice", &interactions(&["1"], &["1"]));
        let dataset = builder.build();

        assert_eq!(dataset.entries.len(), 1);
        assert_eq!(dataset.entries[0].rating, 1.0);
        assert_eq!(dataset.index.num_items(), 1);
    }

    #[test]
    fn test_indices_assigned_in_first_seen_order() {
        let mut builder = DatasetBuilder::new();
        builder
            .add_user("alice", &interactions(&["10"], &["20"]))
            .add_user("bob", &interactions(&["30"], &["10"]));
        let dataset = builder.build();

        assert_eq!(dataset.index.user_position("alice"), Some(0));
        assert_eq!(dataset.index.user_position("bob"), Some(1));
        let ids: Vec<&str> = dataset
            .index
            .items()
            .iter()
            .map(|k| k.item_id.as_str())
            .collect();
        assert_eq!(ids, vec!["10", "20", "30"]);
        assert_eq!(dataset.entries.len(), 4);
    }

    #[test]
    fn test_user_without_events_not_indexed() {
        let mut builder = DatasetBuilder::new();
        builder.add_user("idle", &UserInteractions::new());
        let dataset = builder.build();
        assert_eq!(dataset.index.num_users(), 0);
        assert!(dataset.is_empty());
    }

    #[test]
    fn test_registered_item_has_no_entries() {
        let mut builder = DatasetBuilder::new();
        builder.add_user("alice", &interactions(&[], &["1"]));
        builder.register_item(&ItemKey::new(Category::Movie, "3"));
        let dataset = builder.build();

        assert_eq!(dataset.index.num_items(), 2);
        assert_eq!(dataset.users_by_item()[1], Vec::<usize>::new());
        assert_eq!(dataset.items_by_user(), vec![vec![0]]);
    }

    #[test]
    fn test_index_roundtrip_preserves_generation_and_lookups() {
        let mut builder = DatasetBuilder::new();
        builder.add_user("alice", &interactions(&["1", "2"], &[]));
        let index = builder.build().index;

        let json = serde_json::to_string(&index).unwrap();
        let restored: InteractionIndex = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.generation(), index.generation());
        assert_eq!(restored.item_position(&ItemKey::new(Category::Movie, "2")), Some(1));
        assert_eq!(restored.user_at(0), Some("alice"));
    }

    #[test]
    fn test_index_with_duplicate_user_rejected() {
        let json = format!(
            r#"{{"generation":"{}","users":["a","a"],"items":[]}}"#,
            Uuid::new_v4()
        );
        assert!(serde_json::from_str::<InteractionIndex>(&json).is_err());
    }

    #[test]
    fn test_each_build_gets_new_generation() {
        let first = DatasetBuilder::new().build();
        let second = DatasetBuilder::new().build();
        assert_ne!(first.index.generation(), second.index.generation());
    }

    #[tokio::test]
    async fn test_build_dataset_from_repository() {
        let repo = InMemoryRepository::new();
        let movie = |id: &str| InteractionEvent::new(Category::Movie, id, id);
        repo.record_interaction("alice", ListKind::Liked, movie("1")).await.unwrap();
        repo.record_interaction("alice", ListKind::Liked, movie("1")).await.unwrap();
        repo.record_interaction("alice", ListKind::Watched, movie("1")).await.unwrap();
        repo.record_interaction("bob", ListKind::Liked, movie("2")).await.unwrap();
        repo.add_user("carol").await;

        let dataset = build_dataset(&repo).await.unwrap();

        assert_eq!(dataset.entries.len(), 2);
        assert_eq!(dataset.index.num_users(), 2);
        assert_eq!(dataset.index.user_position("carol"), None);
    }
}
