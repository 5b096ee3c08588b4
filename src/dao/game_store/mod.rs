pub mod memory;
#[cfg(feature = "redis-store")]
pub mod redis;

use std::time::Duration;

use futures::future::BoxFuture;

use crate::dao::{
    models::GameRecord,
    storage::{StorageError, StorageResult},
};

/// Namespace shared by every game key.
pub const GAME_KEY_PREFIX: &str = "game:";

/// Abstraction over the key-value store holding one record per game, with expiry.
pub trait GameStateStore: Send + Sync {
    /// Fetch the record stored for `game_id`; expired records behave as absent.
    fn load(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;
    /// Overwrite the record for `game_id` and refresh its expiry.
    fn save(
        &self,
        game_id: &str,
        record: GameRecord,
        ttl: Duration,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the record for `game_id` if present.
    fn delete(&self, game_id: &str) -> BoxFuture<'static, StorageResult<()>>;
    /// Drop every game record, returning how many were removed.
    fn clear_all(&self) -> BoxFuture<'static, StorageResult<usize>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Key under which the record of `game_id` lives.
pub fn game_key(game_id: &str) -> String {
    format!("{GAME_KEY_PREFIX}{game_id}")
}

fn encode_record(key: &str, record: &GameRecord) -> StorageResult<String> {
    serde_json::to_string(record).map_err(|source| StorageError::Corrupt {
        key: key.to_owned(),
        source,
    })
}

fn decode_record(key: &str, payload: &str) -> StorageResult<GameRecord> {
    serde_json::from_str(payload).map_err(|source| StorageError::Corrupt {
        key: key.to_owned(),
        source,
    })
}
