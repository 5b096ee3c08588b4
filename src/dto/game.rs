use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

use crate::{
    dto::{
        format_system_time,
        ws::{GameInfo, PlayerSummary},
    },
    services::events,
    state::{
        game::{GameState, GameStatus},
        hub::RoomSnapshot,
    },
};

/// Payload used to open a new game with its creator seated.
#[derive(Debug, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_no_whitespace"))]
    pub player_id: String,
    #[validate(length(min = 1, max = 64))]
    pub player_name: String,
    /// Defaults to the configured capacity when omitted.
    #[validate(range(min = 1))]
    pub capacity: Option<usize>,
}

/// Rejects identifiers containing whitespace.
fn validate_no_whitespace(value: &str) -> Result<(), ValidationError> {
    if value.chars().any(char::is_whitespace) {
        let mut err = ValidationError::new("whitespace");
        err.message = Some("identifier must not contain whitespace".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameResponse {
    pub game_id: String,
    pub game: GameView,
}

/// Public view of a game; the secret number is never exposed.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameView {
    pub status: GameStatus,
    pub round: u32,
    pub players: Vec<PlayerSummary>,
    pub info: GameInfo,
    /// Scores keyed by player order.
    pub scores: Vec<PlayerScore>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_id: String,
    pub score: i64,
    pub last_guess: i64,
}

impl From<&GameState> for GameView {
    fn from(game: &GameState) -> Self {
        Self {
            status: game.status,
            round: game.round,
            players: events::roster(game),
            info: events::game_info(game),
            scores: game
                .players
                .iter()
                .map(|player| PlayerScore {
                    player_id: player.id.clone(),
                    score: player.score,
                    last_guess: player.last_guess,
                })
                .collect(),
        }
    }
}

/// Diagnostic description of a live room.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub game_id: String,
    pub connections: usize,
    /// RFC 3339 creation time of the room.
    pub created_at: String,
}

impl From<RoomSnapshot> for RoomSummary {
    fn from(room: RoomSnapshot) -> Self {
        Self {
            game_id: room.id,
            connections: room.connections,
            created_at: format_system_time(room.created_at),
        }
    }
}

/// Sort rooms newest first for display.
pub fn sorted_rooms(mut rooms: Vec<RoomSnapshot>) -> Vec<RoomSummary> {
    rooms.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    rooms.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;

    #[test]
    fn request_validation() {
        let valid = CreateGameRequest {
            player_id: "p1".into(),
            player_name: "Ada".into(),
            capacity: Some(4),
        };
        assert!(valid.validate().is_ok());

        let spaced = CreateGameRequest {
            player_id: "p 1".into(),
            ..valid
        };
        assert!(spaced.validate().is_err());

        let empty = CreateGameRequest {
            player_id: "p1".into(),
            player_name: String::new(),
            capacity: Some(0),
        };
        let errors = empty.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("player_name"));
        assert!(errors.field_errors().contains_key("capacity"));
    }

    #[test]
    fn game_view_hides_the_secret() {
        let mut game = GameState::new(3, 1, 100, 77);
        game.add_player("p1", "Ada").unwrap();
        let json = serde_json::to_value(GameView::from(&game)).unwrap();
        assert!(!json.to_string().contains("77"));
        assert_eq!(json["players"][0]["name"], "Ada");
        assert_eq!(json["info"]["maxPlayers"], 3);
    }

    #[test]
    fn rooms_are_listed_newest_first() {
        let now = SystemTime::now();
        let rooms = vec![
            RoomSnapshot {
                id: "old".into(),
                connections: 1,
                created_at: now - Duration::from_secs(60),
            },
            RoomSnapshot {
                id: "new".into(),
                connections: 2,
                created_at: now,
            },
        ];
        let sorted = sorted_rooms(rooms);
        assert_eq!(sorted[0].game_id, "new");
        assert_eq!(sorted[1].connections, 1);
    }
}
