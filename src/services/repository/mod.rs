/// Interaction store abstraction
///
/// The engine never talks to a database directly. Every component that needs
/// per-user feedback or social data receives an `Arc<dyn InteractionRepository>`,
/// so the PostgreSQL adapter and the in-memory adapter are interchangeable.
use crate::{
    error::AppResult,
    models::{InteractionEvent, ItemKey, ListKind, SocialRecommendation, UserInteractions},
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PgInteractionRepository;

/// Typed read/write contract over the external interaction store
#[async_trait::async_trait]
pub trait InteractionRepository: Send + Sync {
    /// All known users, in a stable order
    async fn list_users(&self) -> AppResult<Vec<String>>;

    /// A user's watched and liked lists, or `None` when the store has no entry for the user
    async fn get_interactions(&self, username: &str) -> AppResult<Option<UserInteractions>>;

    /// Adds an event with set semantics; returns whether anything was inserted
    async fn record_interaction(
        &self,
        username: &str,
        list: ListKind,
        event: InteractionEvent,
    ) -> AppResult<bool>;

    /// Accepted friends of a user
    async fn get_friends(&self, username: &str) -> AppResult<Vec<String>>;

    /// Recommendations addressed to this user
    async fn received_recommendations(&self, username: &str)
        -> AppResult<Vec<SocialRecommendation>>;

    /// Items the store knows about beyond user lists
    ///
    /// These enter the item index without feedback so they can be ranked.
    async fn list_catalog_items(&self) -> AppResult<Vec<ItemKey>> {
        Ok(Vec::new())
    }

    /// Repository name for logging and debugging
    fn name(&self) -> &'static str;
}
