use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Failures surfaced by the game coordinator and the connection pump.
///
/// The display strings are user facing: they travel verbatim inside `error`
/// events broadcast to a room.
#[derive(Debug, Error)]
pub enum GameError {
    /// Game record is missing or has expired.
    #[error("game `{0}` not found")]
    NotFound(String),
    /// Operation is not valid for the current game status.
    #[error("invalid game state: {0}")]
    WrongState(String),
    /// Game already holds as many players as it allows.
    #[error("game is full ({capacity}/{capacity} players)")]
    RoomFull {
        /// Capacity fixed at creation.
        capacity: usize,
    },
    /// Player is already seated in the game.
    #[error("player `{0}` already joined this game")]
    DuplicatePlayer(String),
    /// Player is not seated in the game.
    #[error("player `{0}` is not part of this game")]
    PlayerNotInGame(String),
    /// Player already guessed during the current cycle of turns.
    #[error("you already guessed this round, wait for the other players")]
    AlreadyGuessed,
    /// Guess lies outside of the game range; the turn is not consumed.
    #[error("guess {value} must be between {min} and {max}")]
    OutOfRange {
        /// Offending guess.
        value: i64,
        /// Lower bound (inclusive).
        min: i64,
        /// Upper bound (inclusive).
        max: i64,
    },
    /// At least one player has not flagged themselves as ready.
    #[error("not every player is ready")]
    NotAllReady,
    /// The backing store failed or did not answer in time.
    #[error("game store unavailable")]
    StoreUnavailable(#[from] StorageError),
    /// Inbound frame could not be decoded into a command.
    #[error("malformed command: {0}")]
    MalformedCommand(String),
}

impl GameError {
    /// Whether the error is a transient infrastructure failure rather than a rule violation.
    pub fn is_transient(&self) -> bool {
        matches!(self, GameError::StoreUnavailable(_))
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        let message = err.to_string();
        match err {
            GameError::NotFound(_) => AppError::NotFound(message),
            GameError::WrongState(_)
            | GameError::RoomFull { .. }
            | GameError::DuplicatePlayer(_)
            | GameError::NotAllReady
            | GameError::AlreadyGuessed => AppError::Conflict(message),
            GameError::PlayerNotInGame(_)
            | GameError::OutOfRange { .. }
            | GameError::MalformedCommand(_) => AppError::BadRequest(message),
            GameError::StoreUnavailable(source) => AppError::ServiceUnavailable(source.to_string()),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
