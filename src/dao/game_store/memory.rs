//! In-process game store used when no Redis endpoint is configured, and by tests.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use futures::future::BoxFuture;

use super::{GAME_KEY_PREFIX, GameStateStore, decode_record, encode_record, game_key};
use crate::dao::{models::GameRecord, storage::StorageResult};

struct StoredRecord {
    payload: String,
    expires_at: Instant,
}

/// Map of serialized records with per-entry deadlines.
///
/// Records are kept as JSON so the store honours the same contract as the
/// Redis backend.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    entries: Arc<DashMap<String, StoredRecord>>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evict every record whose deadline passed, returning how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before - self.entries.len()
    }

    /// Number of stored records, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GameStateStore for MemoryGameStore {
    fn load(&self, game_id: &str) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let entries = self.entries.clone();
        let key = game_key(game_id);
        Box::pin(async move {
            let lookup = entries
                .get(&key)
                .map(|entry| (entry.payload.clone(), entry.expires_at));
            match lookup {
                Some((payload, expires_at)) if expires_at > Instant::now() => {
                    decode_record(&key, &payload).map(Some)
                }
                Some(_) => {
                    entries.remove_if(&key, |_, entry| entry.expires_at <= Instant::now());
                    Ok(None)
                }
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
        let entries = self.entries.clone();
        let key = game_key(game_id);
        Box::pin(async move {
            let payload = encode_record(&key, &record)?;
            entries.insert(
                key,
                StoredRecord {
                    payload,
                    expires_at: Instant::now() + ttl,
                },
            );
            Ok(())
        })
    }

    fn delete(&self, game_id: &str) -> BoxFuture<'static, StorageResult<()>> {
        let entries = self.entries.clone();
        let key = game_key(game_id);
        Box::pin(async move {
            entries.remove(&key);
            Ok(())
        })
    }

    fn clear_all(&self) -> BoxFuture<'static, StorageResult<usize>> {
        let entries = self.entries.clone();
        Box::pin(async move {
            let before = entries.len();
            entries.retain(|key, _| !key.starts_with(GAME_KEY_PREFIX));
            Ok(before - entries.len())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
