use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::GameError;

/// Identifier of a player, assigned by the authentication layer.
pub type PlayerId = String;

/// Lifecycle of a game: waiting for players, playing turns, or won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum GameStatus {
    /// Lobby phase; players join and flag themselves as ready.
    Waiting,
    /// Turns are being played.
    Playing,
    /// Someone found the secret number.
    Finished,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GameStatus::Waiting => "waiting",
            GameStatus::Playing => "playing",
            GameStatus::Finished => "finished",
        };
        f.write_str(label)
    }
}

/// Player seated in a game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    /// Stable identifier, unique within the game.
    pub id: PlayerId,
    /// Name shown to the other players.
    pub display_name: String,
    /// Most recent in-range guess (0 when none).
    pub last_guess: i64,
    /// Games won since the player joined.
    pub score: i64,
    /// Mirrors the position inside [`GameState::players`].
    pub turn_order: usize,
    /// Whether the player already guessed during the current cycle.
    pub has_guessed_this_cycle: bool,
    /// Ready flag toggled in the lobby.
    pub is_ready: bool,
}

impl Player {
    fn new(id: PlayerId, display_name: String, turn_order: usize) -> Self {
        Self {
            id,
            display_name,
            last_guess: 0,
            score: 0,
            turn_order,
            has_guessed_this_cycle: false,
            is_ready: false,
        }
    }
}

/// Result of comparing a guess with the secret number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessHint {
    /// Guess is above the secret.
    TooHigh,
    /// Guess is below the secret.
    TooLow,
    /// Guess matches the secret.
    Correct,
}

impl GuessHint {
    /// Compare `value` against `secret`.
    pub fn evaluate(value: i64, secret: i64) -> Self {
        match value.cmp(&secret) {
            std::cmp::Ordering::Greater => GuessHint::TooHigh,
            std::cmp::Ordering::Less => GuessHint::TooLow,
            std::cmp::Ordering::Equal => GuessHint::Correct,
        }
    }
}

/// Aggregate persisted once per game identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    /// Maximum number of players, fixed at creation.
    pub capacity: usize,
    /// Number to find, always inside `[min_range, max_range]`.
    pub secret_number: i64,
    /// Incremented on every reset.
    pub round: u32,
    /// Lower bound of valid guesses.
    pub min_range: i64,
    /// Upper bound of valid guesses.
    pub max_range: i64,
    /// Current lifecycle status.
    pub status: GameStatus,
    /// Seated players, in turn order.
    pub players: Vec<Player>,
    /// Index into `players` of the player whose turn it is.
    pub current_turn_index: usize,
    /// Players who acted since the last full cycle.
    pub guessed_this_cycle: BTreeSet<PlayerId>,
}

impl GameState {
    /// Build a fresh game in the waiting state.
    pub fn new(capacity: usize, min_range: i64, max_range: i64, secret_number: i64) -> Self {
        Self {
            capacity,
            secret_number: secret_number.clamp(min_range, max_range),
            round: 0,
            min_range,
            max_range,
            status: GameStatus::Waiting,
            players: Vec::new(),
            current_turn_index: 0,
            guessed_this_cycle: BTreeSet::new(),
        }
    }

    /// Look up a seated player.
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    /// Player whose turn it currently is, if anyone is seated.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(self.current_turn_index)
    }

    /// Number of players flagged as ready.
    pub fn ready_count(&self) -> usize {
        self.players.iter().filter(|player| player.is_ready).count()
    }

    /// Seat a new player at the end of the turn order.
    pub fn add_player(&mut self, player_id: &str, display_name: &str) -> Result<(), GameError> {
        if self.status == GameStatus::Playing {
            return Err(GameError::WrongState(format!(
                "cannot join while the game is {}",
                self.status
            )));
        }
        if self.players.len() >= self.capacity {
            return Err(GameError::RoomFull {
                capacity: self.capacity,
            });
        }
        if self.player(player_id).is_some() {
            return Err(GameError::DuplicatePlayer(player_id.to_owned()));
        }

        let turn_order = self.players.len();
        self.players.push(Player::new(
            player_id.to_owned(),
            display_name.to_owned(),
            turn_order,
        ));
        Ok(())
    }

    /// Flip the ready flag of a player, returning the new value.
    pub fn toggle_ready(&mut self, player_id: &str) -> Result<bool, GameError> {
        if self.status == GameStatus::Playing {
            return Err(GameError::WrongState(
                "cannot change readiness while the game is playing".into(),
            ));
        }
        let player = self
            .players
            .iter_mut()
            .find(|player| player.id == player_id)
            .ok_or_else(|| GameError::PlayerNotInGame(player_id.to_owned()))?;
        player.is_ready = !player.is_ready;
        Ok(player.is_ready)
    }

    /// Move from waiting to playing once everyone is ready.
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.status != GameStatus::Waiting {
            return Err(GameError::WrongState(format!(
                "cannot start while the game is {}",
                self.status
            )));
        }
        if self.players.iter().any(|player| !player.is_ready) {
            return Err(GameError::NotAllReady);
        }

        self.status = GameStatus::Playing;
        self.current_turn_index = 0;
        self.clear_cycle();
        Ok(())
    }

    /// Record a guess and advance the turn.
    ///
    /// Out-of-range values are rejected before anything is recorded so the
    /// player keeps their turn.
    pub fn guess(&mut self, player_id: &str, value: i64) -> Result<GuessHint, GameError> {
        if self.status != GameStatus::Playing {
            return Err(GameError::WrongState(format!(
                "cannot guess while the game is {}",
                self.status
            )));
        }
        let index = self
            .players
            .iter()
            .position(|player| player.id == player_id)
            .ok_or_else(|| GameError::PlayerNotInGame(player_id.to_owned()))?;
        if self.guessed_this_cycle.contains(player_id) {
            return Err(GameError::AlreadyGuessed);
        }
        if value < self.min_range || value > self.max_range {
            return Err(GameError::OutOfRange {
                value,
                min: self.min_range,
                max: self.max_range,
            });
        }

        self.guessed_this_cycle.insert(player_id.to_owned());
        let player = &mut self.players[index];
        player.has_guessed_this_cycle = true;
        player.last_guess = value;

        let hint = GuessHint::evaluate(value, self.secret_number);
        if hint == GuessHint::Correct {
            player.score += 1;
            self.status = GameStatus::Finished;
            return Ok(hint);
        }

        self.current_turn_index = (self.current_turn_index + 1) % self.players.len();
        if self.current_turn_index == 0 {
            self.clear_cycle();
        }
        Ok(hint)
    }

    /// Remove a player and renumber the remaining turn order.
    ///
    /// Returns `false` when the player was not seated.
    pub fn remove_player(&mut self, player_id: &str) -> bool {
        let Some(index) = self
            .players
            .iter()
            .position(|player| player.id == player_id)
        else {
            return false;
        };

        self.players.remove(index);
        self.guessed_this_cycle.remove(player_id);
        self.renumber();

        if self.players.is_empty() {
            self.current_turn_index = 0;
        } else if index < self.current_turn_index {
            self.current_turn_index -= 1;
        } else if self.current_turn_index >= self.players.len() {
            self.current_turn_index = 0;
        }
        true
    }

    /// Start a new round with a fresh secret, keeping the seated players.
    pub fn reset(&mut self, secret_number: i64) {
        self.round += 1;
        self.secret_number = secret_number.clamp(self.min_range, self.max_range);
        self.status = GameStatus::Waiting;
        self.current_turn_index = 0;
        self.guessed_this_cycle.clear();
        for player in &mut self.players {
            player.is_ready = false;
            player.has_guessed_this_cycle = false;
            player.last_guess = 0;
        }
        self.renumber();
    }

    fn clear_cycle(&mut self) {
        self.guessed_this_cycle.clear();
        for player in &mut self.players {
            player.has_guessed_this_cycle = false;
        }
    }

    fn renumber(&mut self) {
        for (position, player) in self.players.iter_mut().enumerate() {
            player.turn_order = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby(ids: &[&str]) -> GameState {
        let mut game = GameState::new(ids.len().max(1), 1, 100, 42);
        for id in ids {
            game.add_player(id, &id.to_uppercase()).unwrap();
        }
        game
    }

    fn playing(ids: &[&str]) -> GameState {
        let mut game = lobby(ids);
        for id in ids {
            game.toggle_ready(id).unwrap();
        }
        game.start().unwrap();
        game
    }

    fn assert_turn_order(game: &GameState) {
        for (index, player) in game.players.iter().enumerate() {
            assert_eq!(player.turn_order, index);
        }
    }

    #[test]
    fn add_player_respects_capacity_and_uniqueness() {
        let mut game = GameState::new(2, 1, 100, 10);
        game.add_player("a", "A").unwrap();
        assert!(matches!(
            game.add_player("a", "A"),
            Err(GameError::DuplicatePlayer(_))
        ));
        game.add_player("b", "B").unwrap();
        assert!(matches!(
            game.add_player("c", "C"),
            Err(GameError::RoomFull { capacity: 2 })
        ));
        assert_eq!(game.players.len(), 2);
        assert_turn_order(&game);
    }

    #[test]
    fn cannot_join_a_running_game() {
        let mut game = playing(&["a"]);
        game.capacity = 3;
        assert!(matches!(
            game.add_player("b", "B"),
            Err(GameError::WrongState(_))
        ));
    }

    #[test]
    fn start_requires_everyone_ready_and_leaves_state_untouched_on_failure() {
        let mut game = lobby(&["a", "b"]);
        let before = game.clone();
        assert!(matches!(game.start(), Err(GameError::NotAllReady)));
        assert_eq!(game, before);

        game.toggle_ready("a").unwrap();
        game.toggle_ready("b").unwrap();
        game.start().unwrap();
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.current_turn_index, 0);

        let running = game.clone();
        assert!(matches!(game.start(), Err(GameError::WrongState(_))));
        assert_eq!(game, running);
    }

    #[test]
    fn toggle_ready_flips_and_rejects_strangers() {
        let mut game = lobby(&["a"]);
        assert!(game.toggle_ready("a").unwrap());
        assert!(!game.toggle_ready("a").unwrap());
        assert!(matches!(
            game.toggle_ready("z"),
            Err(GameError::PlayerNotInGame(_))
        ));
    }

    #[test]
    fn wrong_guess_passes_the_turn() {
        let mut game = playing(&["a", "b"]);
        let hint = game.guess("a", 37).unwrap();
        assert_eq!(hint, GuessHint::TooLow);
        assert_eq!(game.current_turn_index, 1);
        assert_eq!(game.status, GameStatus::Playing);
        assert_eq!(game.player("a").unwrap().last_guess, 37);
        assert!(game.player("a").unwrap().has_guessed_this_cycle);
    }

    #[test]
    fn turn_rotation_wraps_and_clears_the_cycle() {
        let mut game = playing(&["a", "b", "c"]);
        game.guess("a", 10).unwrap();
        assert_eq!(game.current_turn_index, 1);
        game.guess("b", 90).unwrap();
        assert_eq!(game.current_turn_index, 2);
        game.guess("c", 50).unwrap();
        assert_eq!(game.current_turn_index, 0);
        assert!(game.guessed_this_cycle.is_empty());
        assert!(game.players.iter().all(|p| !p.has_guessed_this_cycle));
    }

    #[test]
    fn second_guess_in_a_cycle_is_rejected() {
        let mut game = playing(&["a", "b"]);
        game.guess("a", 10).unwrap();
        assert!(matches!(game.guess("a", 11), Err(GameError::AlreadyGuessed)));
    }

    #[test]
    fn out_of_range_guess_does_not_consume_the_turn() {
        let mut game = playing(&["a", "b"]);
        let before = game.clone();
        assert!(matches!(
            game.guess("a", 101),
            Err(GameError::OutOfRange { value: 101, .. })
        ));
        assert_eq!(game, before);
        game.guess("a", 20).unwrap();
    }

    #[test]
    fn correct_guess_finishes_the_game() {
        let mut game = playing(&["a", "b"]);
        assert_eq!(game.guess("a", 42).unwrap(), GuessHint::Correct);
        assert_eq!(game.status, GameStatus::Finished);
        assert_eq!(game.player("a").unwrap().score, 1);
        assert!(matches!(game.guess("b", 42), Err(GameError::WrongState(_))));
    }

    #[test]
    fn remove_player_renumbers_and_keeps_turn_valid() {
        let mut game = playing(&["a", "b", "c"]);
        game.guess("a", 1).unwrap();
        game.guess("b", 2).unwrap();
        assert_eq!(game.current_turn_index, 2);

        assert!(game.remove_player("a"));
        assert_turn_order(&game);
        assert_eq!(game.current_player().unwrap().id, "c");

        assert!(game.remove_player("c"));
        assert_eq!(game.current_turn_index, 0);
        assert!(!game.remove_player("missing"));
    }

    #[test]
    fn reset_starts_a_new_round() {
        let mut game = playing(&["a", "b"]);
        game.guess("a", 42).unwrap();
        game.reset(77);
        assert_eq!(game.round, 1);
        assert_eq!(game.secret_number, 77);
        assert_eq!(game.status, GameStatus::Waiting);
        assert!(game.guessed_this_cycle.is_empty());
        assert!(game.players.iter().all(|p| !p.is_ready && p.last_guess == 0));
        assert_eq!(game.player("a").unwrap().score, 1);
        assert_turn_order(&game);
    }

    #[test]
    fn secret_is_kept_inside_the_range() {
        let game = GameState::new(2, 1, 100, 500);
        assert_eq!(game.secret_number, 100);
    }
}
