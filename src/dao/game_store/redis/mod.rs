//! Redis-backed game store: one JSON string per game under `game:<id>`, with `SETEX` expiry.

mod config;
mod error;
pub mod store;

pub use config::RedisConfig;
pub use error::RedisDaoError;
pub use store::RedisGameStore;

use crate::dao::storage::StorageError;

impl From<RedisDaoError> for StorageError {
    fn from(err: RedisDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
