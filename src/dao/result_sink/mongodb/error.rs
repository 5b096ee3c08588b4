use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB result sink. Connection strings are never echoed
/// since they may carry credentials.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("invalid MongoDB connection string")]
    InvalidUri {
        #[source]
        source: MongoError,
    },
    #[error("cannot create MongoDB client")]
    Client {
        #[source]
        source: MongoError,
    },
    #[error("results database `{database}` is unreachable")]
    Unreachable {
        database: String,
        #[source]
        source: MongoError,
    },
    #[error("cannot create unique index `{index}` on `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("cannot insert into `{collection}` ({key})")]
    Insert {
        collection: &'static str,
        key: String,
        #[source]
        source: MongoError,
    },
}
