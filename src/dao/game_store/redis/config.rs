use super::error::{RedisDaoError, RedisResult};

/// Connection parameters for the Redis game store.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

impl RedisConfig {
    pub fn from_url(url: &str) -> Self {
        Self {
            url: url.to_owned(),
        }
    }

    /// Read `REDIS_URL`, returning `None` when it is unset or blank.
    pub fn from_env() -> Option<Self> {
        std::env::var("REDIS_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|url| Self::from_url(url.trim()))
    }

    pub(super) fn client(&self) -> RedisResult<redis::Client> {
        redis::Client::open(self.url.as_str()).map_err(|source| RedisDaoError::InvalidUrl {
            url: self.url.clone(),
            source,
        })
    }
}
