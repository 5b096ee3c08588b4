use futures::future::BoxFuture;
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::IndexOptions,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    models::{GameResultRecord, ParticipantRecord},
    result_sink::ResultSink,
    storage::StorageResult,
};

const RESULTS_COLLECTION_NAME: &str = "game_results";
const PLAYERS_COLLECTION_NAME: &str = "game_players";
const DUPLICATE_KEY_CODE: i32 = 11000;

/// MongoDB-backed [`ResultSink`] implementation.
///
/// Rows are keyed by game and round, so replaying a report is a no-op.
#[derive(Clone)]
pub struct MongoResultSink {
    database: Database,
}

impl MongoResultSink {
    /// Ping the results database, then make sure the unique indexes exist.
    ///
    /// The ping waits at most the configured server selection timeout.
    pub async fn connect(config: &MongoConfig) -> MongoResult<Self> {
        let client = Client::with_options(config.options.clone())
            .map_err(|source| MongoDaoError::Client { source })?;
        let database = client.database(&config.database_name);
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::Unreachable {
                database: config.database_name.clone(),
                source,
            })?;

        let sink = Self { database };
        sink.ensure_indexes().await?;
        info!(database = %config.database_name, "results database ready");
        Ok(sink)
    }

    fn results(&self) -> Collection<ResultDocument> {
        self.database.collection(RESULTS_COLLECTION_NAME)
    }

    fn players(&self) -> Collection<ParticipantDocument> {
        self.database.collection(PLAYERS_COLLECTION_NAME)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let unique = |name: &str| {
            IndexOptions::builder()
                .name(Some(name.to_string()))
                .unique(Some(true))
                .build()
        };

        let result_index = IndexModel::builder()
            .keys(doc! {"game_id": 1, "round": 1})
            .options(unique("game_round_idx"))
            .build();
        self.results()
            .create_index(result_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULTS_COLLECTION_NAME,
                index: "game_id,round",
                source,
            })?;

        let player_index = IndexModel::builder()
            .keys(doc! {"game_id": 1, "round": 1, "player_id": 1})
            .options(unique("game_round_player_idx"))
            .build();
        self.players()
            .create_index(player_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: PLAYERS_COLLECTION_NAME,
                index: "game_id,round,player_id",
                source,
            })?;

        Ok(())
    }

    async fn insert_result(&self, result: GameResultRecord) -> MongoResult<()> {
        let key = format!("game `{}` round {}", result.game_id, result.round);
        let document = ResultDocument::from(result);
        insert_once(&self.results(), RESULTS_COLLECTION_NAME, document, key).await
    }

    async fn insert_participant(&self, participant: ParticipantRecord) -> MongoResult<()> {
        let key = format!(
            "game `{}` round {} player `{}`",
            participant.game_id, participant.round, participant.player_id
        );
        let document = ParticipantDocument::from(participant);
        insert_once(&self.players(), PLAYERS_COLLECTION_NAME, document, key).await
    }
}

/// Insert `document`, treating a unique-index violation as already recorded.
async fn insert_once<T>(
    collection: &Collection<T>,
    name: &'static str,
    document: T,
    key: String,
) -> MongoResult<()>
where
    T: Serialize + Send + Sync,
{
    match collection.insert_one(document).await {
        Ok(_) => Ok(()),
        Err(err) if is_duplicate(&err) => {
            debug!(collection = name, %key, "already recorded");
            Ok(())
        }
        Err(source) => Err(MongoDaoError::Insert {
            collection: name,
            key,
            source,
        }),
    }
}

fn is_duplicate(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write)) if write.code == DUPLICATE_KEY_CODE
    )
}

impl ResultSink for MongoResultSink {
    fn record_result(&self, result: GameResultRecord) -> BoxFuture<'static, StorageResult<()>> {
        let sink = self.clone();
        Box::pin(async move { sink.insert_result(result).await.map_err(Into::into) })
    }

    fn record_participant(
        &self,
        participant: ParticipantRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let sink = self.clone();
        Box::pin(async move {
            sink.insert_participant(participant)
                .await
                .map_err(Into::into)
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResultDocument {
    game_id: String,
    winner_id: String,
    round: i64,
    answer: i64,
    total_players: i64,
    recorded_at: DateTime,
}

impl From<GameResultRecord> for ResultDocument {
    fn from(value: GameResultRecord) -> Self {
        Self {
            game_id: value.game_id,
            winner_id: value.winner_id,
            round: i64::from(value.round),
            answer: value.secret_number,
            total_players: value.total_players as i64,
            recorded_at: DateTime::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ParticipantDocument {
    game_id: String,
    player_id: String,
    round: i64,
    turn_order: i64,
    recorded_at: DateTime,
}

impl From<ParticipantRecord> for ParticipantDocument {
    fn from(value: ParticipantRecord) -> Self {
        Self {
            game_id: value.game_id,
            player_id: value.player_id,
            round: i64::from(value.round),
            turn_order: value.turn_order as i64,
            recorded_at: DateTime::now(),
        }
    }
}
