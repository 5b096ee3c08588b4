use serde::{Deserialize, Serialize};

use crate::state::game::{GameState, GameStatus, Player};

/// Serialized form of a game, stored under `game:<id>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameRecord {
    pub capacity: usize,
    pub secret_number: i64,
    pub round: u32,
    pub min_range: i64,
    pub max_range: i64,
    pub status: GameStatus,
    pub players: Vec<PlayerRecord>,
    pub current_turn_index: usize,
    /// Player ids that acted since the last full cycle, sorted.
    pub guessed_this_cycle: Vec<String>,
}

/// Serialized form of a seated player.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    pub id: String,
    pub display_name: String,
    pub last_guess: i64,
    pub score: i64,
    pub turn_order: usize,
    pub has_guessed_this_cycle: bool,
    pub is_ready: bool,
}

/// Outcome of a won round, reported to the result sink.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameResultRecord {
    pub game_id: String,
    pub winner_id: String,
    pub round: u32,
    pub secret_number: i64,
    pub total_players: usize,
}

/// Participation of one player in a won round.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantRecord {
    pub game_id: String,
    pub player_id: String,
    pub round: u32,
    pub turn_order: usize,
}

impl From<PlayerRecord> for Player {
    fn from(value: PlayerRecord) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            last_guess: value.last_guess,
            score: value.score,
            turn_order: value.turn_order,
            has_guessed_this_cycle: value.has_guessed_this_cycle,
            is_ready: value.is_ready,
        }
    }
}

impl From<Player> for PlayerRecord {
    fn from(value: Player) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            last_guess: value.last_guess,
            score: value.score,
            turn_order: value.turn_order,
            has_guessed_this_cycle: value.has_guessed_this_cycle,
            is_ready: value.is_ready,
        }
    }
}

impl From<GameRecord> for GameState {
    fn from(value: GameRecord) -> Self {
        Self {
            capacity: value.capacity,
            secret_number: value.secret_number,
            round: value.round,
            min_range: value.min_range,
            max_range: value.max_range,
            status: value.status,
            players: value.players.into_iter().map(Into::into).collect(),
            current_turn_index: value.current_turn_index,
            guessed_this_cycle: value.guessed_this_cycle.into_iter().collect(),
        }
    }
}

impl From<GameState> for GameRecord {
    fn from(value: GameState) -> Self {
        Self {
            capacity: value.capacity,
            secret_number: value.secret_number,
            round: value.round,
            min_range: value.min_range,
            max_range: value.max_range,
            status: value.status,
            players: value.players.into_iter().map(Into::into).collect(),
            current_turn_index: value.current_turn_index,
            guessed_this_cycle: value.guessed_this_cycle.into_iter().collect(),
        }
    }
}

impl GameResultRecord {
    /// Build the result row for a finished game.
    pub fn from_winner(game_id: &str, winner_id: &str, game: &GameState) -> Self {
        Self {
            game_id: game_id.to_owned(),
            winner_id: winner_id.to_owned(),
            round: game.round,
            secret_number: game.secret_number,
            total_players: game.players.len(),
        }
    }
}

impl ParticipantRecord {
    /// One participation row per seated player.
    pub fn for_game(game_id: &str, game: &GameState) -> Vec<Self> {
        game.players
            .iter()
            .map(|player| Self {
                game_id: game_id.to_owned(),
                player_id: player.id.clone(),
                round: game.round,
                turn_order: player.turn_order,
            })
            .collect()
    }
}
