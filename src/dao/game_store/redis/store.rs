use std::time::Duration;

use futures::future::BoxFuture;
use redis::{AsyncCommands, aio::ConnectionManager};
use tokio::time::sleep;
use tracing::{info, warn};

use super::{
    config::RedisConfig,
    error::{RedisDaoError, RedisResult},
};
use crate::dao::{
    game_store::{GAME_KEY_PREFIX, GameStateStore, decode_record, encode_record, game_key},
    models::GameRecord,
    storage::StorageResult,
};

const MAX_CONNECT_ATTEMPTS: u32 = 10;
const BASE_RETRY_DELAY_MS: u64 = 250;

/// Redis-backed [`GameStateStore`] implementation.
///
/// The connection manager reconnects on its own; the store only retries the
/// initial ping.
#[derive(Clone)]
pub struct RedisGameStore {
    connection: ConnectionManager,
}

impl RedisGameStore {
    /// Connect to Redis and wait until it answers `PING`.
    pub async fn connect(config: &RedisConfig) -> RedisResult<Self> {
        let client = config.client()?;
        let mut attempts = 0;
        let mut delay = Duration::from_millis(BASE_RETRY_DELAY_MS);

        loop {
            attempts += 1;
            let outcome = match ConnectionManager::new(client.clone()).await {
                Ok(mut connection) => ping(&mut connection).await.map(|_| connection),
                Err(source) => Err(source),
            };
            match outcome {
                Ok(connection) => {
                    info!(attempts, "connected to Redis");
                    return Ok(Self { connection });
                }
                Err(source) if attempts >= MAX_CONNECT_ATTEMPTS => {
                    return Err(RedisDaoError::InitialPing { attempts, source });
                }
                Err(err) => {
                    warn!(error = %err, attempts, "Redis not reachable yet; retrying");
                    sleep(delay).await;
                    delay = (delay * 2).min(Duration::from_secs(5));
                }
            }
        }
    }

    async fn load_record(&self, key: String) -> RedisResult<Option<String>> {
        let mut connection = self.connection.clone();
        connection
            .get(&key)
            .await
            .map_err(|source| RedisDaoError::Load { key, source })
    }

    async fn save_record(&self, key: String, payload: String, ttl: Duration) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        let seconds = ttl.as_secs().max(1);
        connection
            .set_ex::<_, _, ()>(&key, payload, seconds)
            .await
            .map_err(|source| RedisDaoError::Save { key, source })
    }

    async fn delete_record(&self, key: String) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(&key)
            .await
            .map_err(|source| RedisDaoError::Delete { key, source })
    }

    async fn sweep(&self) -> RedisResult<usize> {
        let pattern = format!("{GAME_KEY_PREFIX}*");
        let mut connection = self.connection.clone();
        let keys: Vec<String> =
            connection
                .keys(&pattern)
                .await
                .map_err(|source| RedisDaoError::Sweep {
                    pattern: pattern.clone(),
                    source,
                })?;
        if keys.is_empty() {
            return Ok(0);
        }
        connection
            .del::<_, usize>(keys)
            .await
            .map_err(|source| RedisDaoError::Sweep { pattern, source })
    }

    async fn health(&self) -> RedisResult<()> {
        let mut connection = self.connection.clone();
        ping(&mut connection)
            .await
            .map_err(|source| RedisDaoError::HealthPing { source })
    }
}

async fn ping(connection: &mut ConnectionManager) -> redis::RedisResult<()> {
    let _pong: String = redis::cmd("PING").query_async(connection).await?;
    Ok(())
}

impl GameStateStore for RedisGameStore {
    fn load(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let store = self.clone();
        let key = game_key(game_id);
        Box::pin(async move {
            match store.load_record(key.clone()).await? {
                Some(payload) => decode_record(&key, &payload).map(Some),
                None => Ok(None),
            }
        })
    }

    fn save(
        &self,
        game_id: &str,
        record: GameRecord,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = game_key(game_id);
        Box::pin(async move {
            let payload = encode_record(&key, &record)?;
            store
                .save_record(key, payload, ttl)
                .await
                .map_err(Into::into)
        })
    }

    fn delete(&self, game_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        let key = game_key(game_id);
        Box::pin(async move { store.delete_record(key).await.map_err(Into::into) })
    }

    fn clear_all(&self) -> BoxFuture<'static, StorageResult<usize>> {
        let store = self.clone();
        Box::pin(async move { store.sweep().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.health().await.map_err(Into::into) })
    }
}
