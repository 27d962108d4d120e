use std::fmt::Display;

use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};

use crate::{
    error::AppResult,
    models::{Category, ItemKey},
};

/// Keys for content metadata cached in Redis
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Genre names of one catalog item
    Genres(ItemKey),
    /// Popular listing for a category, first page
    Popular(Category),
    /// Genre id table of a category
    GenreList(Category),
    /// Discovery listing for a category and a `|`-joined set of genre ids
    Discover(Category, String),
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheKey::Genres(key) => write!(f, "genres:{}:{}", key.category, key.item_id),
            CacheKey::Popular(category) => write!(f, "popular:{}", category),
            CacheKey::GenreList(category) => write!(f, "genre_list:{}", category),
            CacheKey::Discover(category, genre_ids) => {
                write!(f, "discover:{}:{}", category, genre_ids)
            }
        }
    }
}

/// Opens a Redis client; no connection is made until first use
pub fn create_redis_client(redis_url: &str) -> anyhow::Result<Client> {
    Ok(Client::open(redis_url)?)
}

/// A serialized value waiting to be written
struct PendingWrite {
    key: String,
    json: String,
    ttl_secs: u64,
}

/// Read-through metadata cache
///
/// Reads go straight to Redis. Writes are queued and applied by a single
/// background task, so a lookup never waits on a write.
#[derive(Clone)]
pub struct Cache {
    client: Client,
    writes: mpsc::UnboundedSender<PendingWrite>,
}

/// Stops the background writer once queued writes are applied
pub struct CacheWriterHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl CacheWriterHandle {
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Cache writer task panicked");
        }
    }
}

/// Applies queued writes over one reused connection
struct CacheWriter {
    client: Client,
    connection: Option<MultiplexedConnection>,
}

impl CacheWriter {
    async fn run(
        mut self,
        mut writes: mpsc::UnboundedReceiver<PendingWrite>,
        mut stop: oneshot::Receiver<()>,
    ) {
        tracing::debug!("Cache writer started");

        loop {
            tokio::select! {
                Some(write) = writes.recv() => self.apply(write).await,
                _ = &mut stop => break,
                else => break,
            }
        }

        let mut flushed = 0usize;
        while let Ok(write) = writes.try_recv() {
            self.apply(write).await;
            flushed += 1;
        }
        tracing::info!(flushed, "Cache writer stopped");
    }

    async fn apply(&mut self, write: PendingWrite) {
        if let Err(e) = self.set(&write).await {
            // Reconnect on the next write
            self.connection = None;
            tracing::error!(key = %write.key, error = %e, "Cache write failed");
        }
    }

    async fn set(&mut self, write: &PendingWrite) -> AppResult<()> {
        if self.connection.is_none() {
            self.connection = Some(self.client.get_multiplexed_async_connection().await?);
        }
        if let Some(connection) = self.connection.as_mut() {
            let _: () = connection
                .set_ex(&write.key, &write.json, write.ttl_secs)
                .await?;
        }
        Ok(())
    }
}

impl Cache {
    /// Creates the cache and spawns its writer task
    pub async fn new(client: Client) -> (Self, CacheWriterHandle) {
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();

        let writer = CacheWriter {
            client: client.clone(),
            connection: None,
        };
        let task = tokio::spawn(writer.run(writes_rx, stop_rx));

        (
            Self {
                client,
                writes: writes_tx,
            },
            CacheWriterHandle {
                stop: stop_tx,
                task,
            },
        )
    }

    /// Cached value for `key`
    ///
    /// Redis failures and undecodable entries count as a miss, so callers fall
    /// through to the upstream API.
    pub async fn get_from_cache<T: DeserializeOwned>(&self, key: &CacheKey) -> AppResult<Option<T>> {
        let raw = match self.read(key).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return Ok(None);
            }
        };

        let Some(json) = raw else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Discarding undecodable cache entry");
                Ok(None)
            }
        }
    }

    async fn read(&self, key: &CacheKey) -> AppResult<Option<String>> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        Ok(connection.get(key.to_string()).await?)
    }

    /// Queues `value` under `key` for `ttl_secs` seconds
    pub fn set_in_background<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) {
        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Value not cacheable");
                return;
            }
        };

        let write = PendingWrite {
            key: key.to_string(),
            json,
            ttl_secs,
        };
        if self.writes.send(write).is_err() {
            tracing::warn!(key = %key, "Cache writer stopped, dropping write");
        }
    }
}
