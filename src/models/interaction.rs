use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, str::FromStr};
use uuid::Uuid;

use super::{Category, ItemKey};

/// Which of a user's lists an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Watched,
    Liked,
}

impl ListKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListKind::Watched => "watched",
            ListKind::Liked => "liked",
        }
    }
}

impl Display for ListKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListKind {
    type Err = crate::error::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watched" => Ok(ListKind::Watched),
            "liked" => Ok(ListKind::Liked),
            other => Err(crate::error::AppError::InvalidInput(format!(
                "Unknown list: {}",
                other
            ))),
        }
    }
}

/// A single implicit-feedback event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEvent {
    pub category: Category,
    pub item_id: String,
    pub title: String,
    pub added_at: DateTime<Utc>,
}

impl InteractionEvent {
    pub fn new(category: Category, item_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            category,
            item_id: item_id.into(),
            title: title.into(),
            added_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.category, self.item_id.clone())
    }
}

/// A user's watched and liked lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserInteractions {
    pub watched: Vec<InteractionEvent>,
    pub liked: Vec<InteractionEvent>,
}

impl UserInteractions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an event with set semantics on (category, item_id)
    ///
    /// Returns `false` when the list already holds the item.
    pub fn add(&mut self, kind: ListKind, event: InteractionEvent) -> bool {
        let list = match kind {
            ListKind::Watched => &mut self.watched,
            ListKind::Liked => &mut self.liked,
        };

        if list
            .iter()
            .any(|e| e.category == event.category && e.item_id == event.item_id)
        {
            return false;
        }

        list.push(event);
        true
    }

    pub fn is_empty(&self) -> bool {
        self.watched.is_empty() && self.liked.is_empty()
    }

    /// Every item on either list, watched first, without duplicates
    pub fn item_keys(&self) -> Vec<ItemKey> {
        let mut seen = std::collections::HashSet::new();
        self.watched
            .iter()
            .chain(self.liked.iter())
            .map(InteractionEvent::key)
            .filter(|key| seen.insert(key.clone()))
            .collect()
    }
}

/// A recommendation message sent from one user to a friend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialRecommendation {
    pub id: Uuid,
    pub from_user: String,
    pub to_user: String,
    pub category: Category,
    pub item_id: String,
    pub title: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl SocialRecommendation {
    pub fn new(
        from_user: impl Into<String>,
        to_user: impl Into<String>,
        category: Category,
        item_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_user: from_user.into(),
            to_user: to_user.into(),
            category,
            item_id: item_id.into(),
            title: title.into(),
            note: None,
            created_at: Utc::now(),
        }
    }

    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.category, self.item_id.clone())
    }
}
