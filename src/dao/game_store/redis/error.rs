use redis::RedisError;
use thiserror::Error;

pub type RedisResult<T> = std::result::Result<T, RedisDaoError>;

#[derive(Debug, Error)]
pub enum RedisDaoError {
    #[error("failed to parse Redis connection URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: RedisError,
    },
    #[error("Redis did not answer the initial ping after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: RedisError,
    },
    #[error("Redis ping health check failed")]
    HealthPing {
        #[source]
        source: RedisError,
    },
    #[error("failed to load `{key}`")]
    Load {
        key: String,
        #[source]
        source: RedisError,
    },
    #[error("failed to save `{key}`")]
    Save {
        key: String,
        #[source]
        source: RedisError,
    },
    #[error("failed to delete `{key}`")]
    Delete {
        key: String,
        #[source]
        source: RedisError,
    },
    #[error("failed to sweep keys matching `{pattern}`")]
    Sweep {
        pattern: String,
        #[source]
        source: RedisError,
    },
}
