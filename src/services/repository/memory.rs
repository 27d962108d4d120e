use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::{
    error::AppResult,
    models::{InteractionEvent, ItemKey, ListKind, SocialRecommendation, UserInteractions},
    services::repository::InteractionRepository,
};

#[derive(Default)]
struct MemoryInner {
    /// Users in first-registration order
    users: Vec<String>,
    interactions: HashMap<String, UserInteractions>,
    friends: HashMap<String, Vec<String>>,
    recommendations: Vec<SocialRecommendation>,
    catalog: Vec<ItemKey>,
}

impl MemoryInner {
    fn ensure_user(&mut self, username: &str) {
        if !self.users.iter().any(|u| u == username) {
            self.users.push(username.to_string());
        }
    }
}

/// Process-local repository used for development and tests
#[derive(Default)]
pub struct InMemoryRepository {
    inner: RwLock<MemoryInner>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user without any interactions
    pub async fn add_user(&self, username: &str) {
        self.inner.write().await.ensure_user(username);
    }

    /// Records a mutual friendship
    pub async fn add_friendship(&self, a: &str, b: &str) {
        let mut inner = self.inner.write().await;
        inner.ensure_user(a);
        inner.ensure_user(b);
        for (user, friend) in [(a, b), (b, a)] {
            let list = inner.friends.entry(user.to_string()).or_default();
            if !list.iter().any(|f| f == friend) {
                list.push(friend.to_string());
            }
        }
    }

    pub async fn send_recommendation(&self, recommendation: SocialRecommendation) {
        self.inner.write().await.recommendations.push(recommendation);
    }

    /// Makes an item known to the catalog without any user signal
    pub async fn add_catalog_item(&self, key: ItemKey) {
        let mut inner = self.inner.write().await;
        if !inner.catalog.contains(&key) {
            inner.catalog.push(key);
        }
    }
}

#[async_trait::async_trait]
impl InteractionRepository for InMemoryRepository {
    async fn list_users(&self) -> AppResult<Vec<String>> {
        Ok(self.inner.read().await.users.clone())
    }

    async fn get_interactions(&self, username: &str) -> AppResult<Option<UserInteractions>> {
        Ok(self.inner.read().await.interactions.get(username).cloned())
    }

    async fn record_interaction(
        &self,
        username: &str,
        list: ListKind,
        event: InteractionEvent,
    ) -> AppResult<bool> {
        let mut inner = self.inner.write().await;
        inner.ensure_user(username);
        Ok(inner
            .interactions
            .entry(username.to_string())
            .or_default()
            .add(list, event))
    }

    async fn get_friends(&self, username: &str) -> AppResult<Vec<String>> {
        Ok(self
            .inner
            .read()
            .await
            .friends
            .get(username)
            .cloned()
            .unwrap_or_default())
    }

    async fn received_recommendations(
        &self,
        username: &str,
    ) -> AppResult<Vec<SocialRecommendation>> {
        Ok(self
            .inner
            .read()
            .await
            .recommendations
            .iter()
            .filter(|r| r.to_user == username)
            .cloned()
            .collect())
    }

    async fn list_catalog_items(&self) -> AppResult<Vec<ItemKey>> {
        let inner = self.inner.read().await;
        let mut items = inner.catalog.clone();
        for rec in &inner.recommendations {
            let key = rec.key();
            if !items.contains(&key) {
                items.push(key);
            }
        }
        Ok(items)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    #[tokio::test]
    async fn test_record_interaction_is_idempotent() {
        let repo = InMemoryRepository::new();
        let event = InteractionEvent::new(Category::Movie, "1", "Alien");

        assert!(repo.record_interaction("alice", ListKind::Liked, event.clone()).await.unwrap());
        assert!(!repo.record_interaction("alice", ListKind::Liked, event).await.unwrap());

        let interactions = repo.get_interactions("alice").await.unwrap().unwrap();
        assert_eq!(interactions.liked.len(), 1);
        assert_eq!(repo.list_users().await.unwrap(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_user_has_no_entry() {
        let repo = InMemoryRepository::new();
        assert!(repo.get_interactions("ghost").await.unwrap().is_none());
        assert!(repo.get_friends("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_friendship_is_mutual() {
        let repo = InMemoryRepository::new();
        repo.add_friendship("alice", "bob").await;
        repo.add_friendship("bob", "alice").await;

        assert_eq!(repo.get_friends("alice").await.unwrap(), vec!["bob".to_string()]);
        assert_eq!(repo.get_friends("bob").await.unwrap(), vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_catalog_includes_recommended_items() {
        let repo = InMemoryRepository::new();
        repo.add_catalog_item(ItemKey::new(Category::Movie, "3")).await;
        repo.send_recommendation(SocialRecommendation::new(
            "bob",
            "alice",
            Category::Show,
            "1396",
            "Breaking Bad",
        ))
        .await;

        let catalog = repo.list_catalog_items().await.unwrap();
        assert_eq!(
            catalog,
            vec![
                ItemKey::new(Category::Movie, "3"),
                ItemKey::new(Category::Show, "1396")
            ]
        );
        assert_eq!(repo.received_recommendations("alice").await.unwrap().len(), 1);
        assert!(repo.received_recommendations("bob").await.unwrap().is_empty());
    }
}
