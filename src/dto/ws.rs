use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::error::GameError;

pub const CMD_CHAT: &str = "chat";
pub const CMD_AUTH: &str = "auth";
pub const CMD_JOIN_GAME: &str = "join_game";
pub const CMD_LEFT_GAME: &str = "left_game";
pub const CMD_START_GAME: &str = "start_game";
pub const CMD_PLAYER_GUESS: &str = "player_guess";
pub const CMD_PLAYER_READY: &str = "player_ready";
pub const CMD_GAME_RESET: &str = "game_reset";

/// Sender name used on every event produced by the server.
pub const SYSTEM_SENDER: &str = "system";
/// Display name used when the upgrade request carries none.
pub const ANONYMOUS_PLAYER: &str = "anonymous";

#[derive(Debug, Deserialize, IntoParams, Validate)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
/// Identity attached to a socket upgrade, already verified by the fronting gateway.
pub struct ConnectQuery {
    #[validate(length(min = 1, max = 64))]
    pub game_id: String,
    #[validate(length(min = 1, max = 64))]
    pub player_id: String,
    #[validate(length(max = 64))]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
/// Frame accepted from game clients.
///
/// `gameId` and `from` are overwritten with the connection's own identity
/// before anything is dispatched or relayed.
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub game_id: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub message: Value,
    #[serde(default)]
    pub from: String,
}

/// Guess value as clients send it: a number, a float, or a numeric string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum GuessPayload {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl GuessPayload {
    /// Canonical integer value; floats are truncated toward zero.
    pub fn to_value(&self) -> Result<i64, GameError> {
        match self {
            GuessPayload::Integer(value) => Ok(*value),
            GuessPayload::Float(value) if value.is_finite() => {
                let truncated = value.trunc();
                if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
                    return Err(GameError::MalformedCommand(format!(
                        "guess `{value}` is not a valid number"
                    )));
                }
                Ok(truncated as i64)
            }
            GuessPayload::Float(value) => Err(GameError::MalformedCommand(format!(
                "guess `{value}` is not a valid number"
            ))),
            GuessPayload::Text(text) => text.trim().parse::<i64>().map_err(|_| {
                GameError::MalformedCommand(format!("guess `{text}` is not a valid number"))
            }),
        }
    }
}

/// Decoded form of an inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Chat(Value),
    Auth,
    JoinGame,
    LeftGame,
    StartGame,
    Guess(i64),
    Ready,
    Reset,
    /// Unrecognised type, forwarded to the room untouched.
    Relay,
}

impl Command {
    /// Map an envelope to a command. Wrong-typed guess payloads are malformed.
    pub fn decode(envelope: &InboundEnvelope) -> Result<Self, GameError> {
        let command = match envelope.kind.as_str() {
            CMD_CHAT => Command::Chat(envelope.message.clone()),
            CMD_AUTH => Command::Auth,
            CMD_JOIN_GAME => Command::JoinGame,
            CMD_LEFT_GAME => Command::LeftGame,
            CMD_START_GAME => Command::StartGame,
            CMD_PLAYER_GUESS => {
                let payload = GuessPayload::deserialize(&envelope.message).map_err(|_| {
                    GameError::MalformedCommand(format!(
                        "guess must be a number, got {}",
                        envelope.message
                    ))
                })?;
                Command::Guess(payload.to_value()?)
            }
            CMD_PLAYER_READY => Command::Ready,
            CMD_GAME_RESET => Command::Reset,
            _ => Command::Relay,
        };
        Ok(command)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
/// Event types emitted by the server.
pub enum EventKind {
    PlayerJoined,
    PlayerLeft,
    GameStarted,
    PlayerGuess,
    GameOver,
    GameReset,
    RoomStatusUpdate,
    PlayerTurn,
    Error,
    Chat,
    Auth,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
/// Frame sent to every connection of a room.
pub struct EventEnvelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub game_id: String,
    pub message: String,
    pub from: String,
    pub player_name: Option<String>,
    pub player_count: Option<usize>,
    pub players: Option<Vec<PlayerSummary>>,
    pub game_info: Option<GameInfo>,
    /// RFC 3339 emission time.
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Roster entry carried by roster-bearing events.
pub struct PlayerSummary {
    pub uuid: String,
    pub name: String,
    pub is_ready: bool,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
/// Public view of a game attached to roster-bearing events.
pub struct GameInfo {
    pub max_players: usize,
    pub current_players: usize,
    pub ready_count: usize,
    pub game_status: String,
    pub min_range: i64,
    pub max_range: i64,
    /// Player whose turn it is while the game is playing.
    pub current_turn: Option<String>,
    pub round: u32,
}

/// Anything the hub can fan out to a room.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RoomMessage {
    Event(EventEnvelope),
    Relay(InboundEnvelope),
}

impl From<EventEnvelope> for RoomMessage {
    fn from(value: EventEnvelope) -> Self {
        RoomMessage::Event(value)
    }
}

impl From<InboundEnvelope> for RoomMessage {
    fn from(value: InboundEnvelope) -> Self {
        RoomMessage::Relay(value)
    }
}
