//! Builders for the events broadcast to a room.

use std::time::SystemTime;

use serde_json::Value;

use crate::{
    dto::{
        format_system_time,
        ws::{EventEnvelope, EventKind, GameInfo, PlayerSummary, SYSTEM_SENDER},
    },
    state::game::{GameState, GameStatus, GuessHint},
};

fn envelope(kind: EventKind, game_id: &str, message: impl Into<String>) -> EventEnvelope {
    EventEnvelope {
        kind,
        game_id: game_id.to_owned(),
        message: message.into(),
        from: SYSTEM_SENDER.to_owned(),
        player_name: None,
        player_count: None,
        players: None,
        game_info: None,
        timestamp: format_system_time(SystemTime::now()),
    }
}

fn with_roster(mut event: EventEnvelope, game: &GameState) -> EventEnvelope {
    event.players = Some(roster(game));
    event.game_info = Some(game_info(game));
    event
}

pub fn roster(game: &GameState) -> Vec<PlayerSummary> {
    game.players
        .iter()
        .map(|player| PlayerSummary {
            uuid: player.id.clone(),
            name: player.display_name.clone(),
            is_ready: player.is_ready,
        })
        .collect()
}

pub fn game_info(game: &GameState) -> GameInfo {
    let current_turn = match game.status {
        GameStatus::Playing => game.current_player().map(|player| player.id.clone()),
        _ => None,
    };
    GameInfo {
        max_players: game.capacity,
        current_players: game.players.len(),
        ready_count: game.ready_count(),
        game_status: game.status.to_string(),
        min_range: game.min_range,
        max_range: game.max_range,
        current_turn,
        round: game.round,
    }
}

/// A socket attached to the room; `player_count` counts sockets, not seats.
pub fn player_joined(game_id: &str, player_name: &str, player_count: usize) -> EventEnvelope {
    let mut event = envelope(
        EventKind::PlayerJoined,
        game_id,
        format!("{player_name} joined the room"),
    );
    event.player_name = Some(player_name.to_owned());
    event.player_count = Some(player_count);
    event
}

pub fn player_left(game_id: &str, player_name: &str, game: Option<&GameState>) -> EventEnvelope {
    let mut event = envelope(
        EventKind::PlayerLeft,
        game_id,
        format!("{player_name} left the game"),
    );
    event.player_name = Some(player_name.to_owned());
    match game {
        Some(game) => with_roster(event, game),
        None => event,
    }
}

/// Human readable occupancy summary, e.g. `2/5 players, 1/2 ready`.
pub fn status_line(game: &GameState) -> String {
    format!(
        "{}/{} players, {}/{} ready",
        game.players.len(),
        game.capacity,
        game.ready_count(),
        game.players.len()
    )
}

pub fn room_status(game_id: &str, game: &GameState, message: impl Into<String>) -> EventEnvelope {
    with_roster(envelope(EventKind::RoomStatusUpdate, game_id, message), game)
}

pub fn game_started(game_id: &str, game: &GameState) -> EventEnvelope {
    let message = format!(
        "game started, guess a number between {} and {}",
        game.min_range, game.max_range
    );
    with_roster(envelope(EventKind::GameStarted, game_id, message), game)
}

/// Announce whose turn it is; `None` when nobody is seated.
pub fn player_turn(game_id: &str, game: &GameState) -> Option<EventEnvelope> {
    let player = game.current_player()?;
    let mut event = envelope(
        EventKind::PlayerTurn,
        game_id,
        format!("it is {}'s turn", player.display_name),
    );
    event.player_name = Some(player.display_name.clone());
    event.game_info = Some(game_info(game));
    Some(event)
}

pub fn player_guess(
    game_id: &str,
    player_name: &str,
    value: i64,
    hint: GuessHint,
) -> EventEnvelope {
    let verdict = match hint {
        GuessHint::TooHigh => "too big",
        GuessHint::TooLow => "too small",
        GuessHint::Correct => "correct",
    };
    let mut event = envelope(
        EventKind::PlayerGuess,
        game_id,
        format!("{player_name} guessed {value}: {verdict}"),
    );
    event.player_name = Some(player_name.to_owned());
    event
}

pub fn game_over(game_id: &str, winner_name: &str, game: &GameState) -> EventEnvelope {
    let message = format!(
        "{winner_name} found the number {} and wins round {}",
        game.secret_number, game.round
    );
    let mut event = with_roster(envelope(EventKind::GameOver, game_id, message), game);
    event.player_name = Some(winner_name.to_owned());
    event
}

pub fn game_reset(game_id: &str, game: &GameState) -> EventEnvelope {
    let message = format!("game reset, round {} is waiting for players", game.round);
    with_roster(envelope(EventKind::GameReset, game_id, message), game)
}

pub fn error(game_id: &str, message: impl Into<String>) -> EventEnvelope {
    envelope(EventKind::Error, game_id, message)
}

pub fn auth(game_id: &str, player_name: &str) -> EventEnvelope {
    let mut event = envelope(EventKind::Auth, game_id, "authenticated");
    event.player_name = Some(player_name.to_owned());
    event
}

/// Chat line; `from` is the sender's name rather than the system.
pub fn chat(game_id: &str, player_name: &str, text: impl Into<String>) -> EventEnvelope {
    let mut event = envelope(EventKind::Chat, game_id, text);
    event.from = player_name.to_owned();
    event.player_name = Some(player_name.to_owned());
    event
}

/// Render a chat payload: a string, an object with a `text` field, or compact JSON.
pub fn chat_text(payload: &Value) -> String {
    match payload {
        Value::String(text) => text.clone(),
        Value::Object(fields) => match fields.get("text") {
            Some(Value::String(text)) => text.clone(),
            _ => payload.to_string(),
        },
        other => other.to_string(),
    }
}
