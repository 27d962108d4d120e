/// PostgreSQL interaction repository
///
/// Tables (see `migrations/`):
/// - `users(username)`
/// - `interactions(username, list_kind, category, item_id, title, added_at)` keyed on
///   (username, list_kind, category, item_id), which makes inserts idempotent
/// - `friendships(username, friend)`, one row per direction
/// - `social_recommendations(id, from_user, to_user, category, item_id, title, note, created_at)`
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        Category, InteractionEvent, ItemKey, ListKind, SocialRecommendation, UserInteractions,
    },
    services::repository::InteractionRepository,
};

#[derive(Clone)]
pub struct PgInteractionRepository {
    pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct InteractionRow {
    list_kind: String,
    category: String,
    item_id: String,
    title: String,
    added_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct RecommendationRow {
    id: Uuid,
    from_user: String,
    to_user: String,
    category: String,
    item_id: String,
    title: String,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    category: String,
    item_id: String,
}

impl TryFrom<RecommendationRow> for SocialRecommendation {
    type Error = AppError;

    fn try_from(row: RecommendationRow) -> Result<Self, Self::Error> {
        Ok(SocialRecommendation {
            id: row.id,
            from_user: row.from_user,
            to_user: row.to_user,
            category: row.category.parse()?,
            item_id: row.item_id,
            title: row.title,
            note: row.note,
            created_at: row.created_at,
        })
    }
}

impl PgInteractionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn user_exists(&self, username: &str) -> AppResult<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}

#[async_trait::async_trait]
impl InteractionRepository for PgInteractionRepository {
    async fn list_users(&self) -> AppResult<Vec<String>> {
        let users: Vec<String> = sqlx::query_scalar("SELECT username FROM users ORDER BY username")
            .fetch_all(&self.pool)
            .await?;
        Ok(users)
    }

    async fn get_interactions(&self, username: &str) -> AppResult<Option<UserInteractions>> {
        if !self.user_exists(username).await? {
            return Ok(None);
        }

        let rows = sqlx::query_as::<_, InteractionRow>(
            r#"
            SELECT list_kind, category, item_id, title, added_at
            FROM interactions
            WHERE username = $1
            ORDER BY added_at, item_id
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        let mut interactions = UserInteractions::new();
        for row in rows {
            let kind: ListKind = row.list_kind.parse()?;
            let category: Category = match row.category.parse() {
                Ok(category) => category,
                Err(e) => {
                    tracing::warn!(username = %username, error = %e, "Skipping interaction with unknown category");
                    continue;
                }
            };
            interactions.add(
                kind,
                InteractionEvent {
                    category,
                    item_id: row.item_id,
                    title: row.title,
                    added_at: row.added_at,
                },
            );
        }

        Ok(Some(interactions))
    }

    async fn record_interaction(
        &self,
        username: &str,
        list: ListKind,
        event: InteractionEvent,
    ) -> AppResult<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO users (username) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind(username)
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query(
            r#"
            INSERT INTO interactions (username, list_kind, category, item_id, title, added_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (username, list_kind, category, item_id) DO NOTHING
            "#,
        )
        .bind(username)
        .bind(list.as_str())
        .bind(event.category.as_str())
        .bind(&event.item_id)
        .bind(&event.title)
        .bind(event.added_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_friends(&self, username: &str) -> AppResult<Vec<String>> {
        let friends: Vec<String> = sqlx::query_scalar(
            "SELECT friend FROM friendships WHERE username = $1 ORDER BY friend",
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        Ok(friends)
    }

    async fn received_recommendations(
        &self,
        username: &str,
    ) -> AppResult<Vec<SocialRecommendation>> {
        let rows = sqlx::query_as::<_, RecommendationRow>(
            r#"
            SELECT id, from_user, to_user, category, item_id, title, note, created_at
            FROM social_recommendations
            WHERE to_user = $1
            ORDER BY created_at
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SocialRecommendation::try_from).collect()
    }

    async fn list_catalog_items(&self) -> AppResult<Vec<ItemKey>> {
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT category, item_id
            FROM social_recommendations
            GROUP BY category, item_id
            ORDER BY MIN(created_at)
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                row.category
                    .parse::<Category>()
                    .ok()
                    .map(|category| ItemKey::new(category, row.item_id))
            })
            .collect())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
