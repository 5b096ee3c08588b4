use std::{env, time::Duration};

use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "guess_room";
const APP_NAME: &str = "guess-room-back";
/// Bounds the startup ping; an unreachable sink is abandoned after this.
const SERVER_SELECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Client options and target database of the results sink.
#[derive(Clone)]
pub struct MongoConfig {
    pub options: ClientOptions,
    pub database_name: String,
}

impl MongoConfig {
    /// Build from raw `MONGO_URI` / `MONGO_DB` values.
    ///
    /// A missing or blank URI disables the sink. The database falls back to the
    /// one named in the URI, then to `guess_room`.
    pub async fn from_vars(
        uri: Option<String>,
        database: Option<String>,
    ) -> MongoResult<Option<Self>> {
        let Some(uri) = non_blank(uri) else {
            return Ok(None);
        };
        let mut options = ClientOptions::parse(&uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri { source })?;
        options.app_name.get_or_insert_with(|| APP_NAME.to_owned());
        options
            .server_selection_timeout
            .get_or_insert(SERVER_SELECTION_TIMEOUT);

        let database_name = non_blank(database)
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_owned());
        Ok(Some(Self {
            options,
            database_name,
        }))
    }

    pub async fn from_env() -> MongoResult<Option<Self>> {
        Self::from_vars(env::var("MONGO_URI").ok(), env::var("MONGO_DB").ok()).await
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
