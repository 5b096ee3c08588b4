//! MongoDB result sink writing to the `game_results` and `game_players` collections.

mod config;
mod error;
pub mod sink;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use sink::MongoResultSink;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
