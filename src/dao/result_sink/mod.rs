//! Destinations for the outcome of won rounds.

#[cfg(feature = "mongo-sink")]
pub mod mongodb;

use futures::future::BoxFuture;
use tracing::info;

use crate::dao::{
    models::{GameResultRecord, ParticipantRecord},
    storage::StorageResult,
};

/// Append-only recorder for finished rounds.
pub trait ResultSink: Send + Sync {
    fn record_result(&self, result: GameResultRecord) -> BoxFuture<'static, StorageResult<()>>;
    fn record_participant(
        &self,
        participant: ParticipantRecord,
    ) -> BoxFuture<'static, StorageResult<()>>;
}

/// Sink that only writes structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingResultSink;

impl ResultSink for TracingResultSink {
    fn record_result(&self, result: GameResultRecord) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            info!(
                game_id = %result.game_id,
                winner_id = %result.winner_id,
                round = result.round,
                secret_number = result.secret_number,
                total_players = result.total_players,
                "game result recorded"
            );
            Ok(())
        })
    }

    fn record_participant(
        &self,
        participant: ParticipantRecord,
    ) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            info!(
                game_id = %participant.game_id,
                player_id = %participant.player_id,
                round = participant.round,
                turn_order = participant.turn_order,
                "game participant recorded"
            );
            Ok(())
        })
    }
}
