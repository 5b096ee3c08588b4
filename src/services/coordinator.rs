//! Validated read-modify-write operations over the game records held by the store.

use std::{sync::Arc, time::Duration};

use dashmap::DashMap;
use futures::future::BoxFuture;
use rand::Rng;
use tokio::{
    sync::{Mutex, OwnedMutexGuard},
    time::timeout,
};
use tracing::{debug, info};

use crate::{
    config::GameSettings,
    dao::{
        game_store::GameStateStore,
        models::GameRecord,
        storage::{StorageError, StorageResult},
    },
    error::GameError,
    state::game::{GameState, GameStatus, GuessHint},
};

/// Outcome of an accepted guess.
#[derive(Debug, Clone)]
pub struct GuessOutcome {
    pub hint: GuessHint,
    /// State persisted after the guess.
    pub state: GameState,
}

impl GuessOutcome {
    pub fn won(&self) -> bool {
        self.hint == GuessHint::Correct
    }
}

/// Result of removing a player from a game.
#[derive(Debug, Clone)]
pub enum LeaveOutcome {
    /// Player removed; the remaining state was persisted.
    Removed(GameState),
    /// Player was the last one seated; the record was deleted.
    Emptied,
    /// Player was not seated; nothing was written.
    NotPresent(GameState),
}

/// Sole writer of game records.
///
/// Mutations of one game are serialized behind a per-game gate so concurrent
/// commands on the same identifier cannot overwrite each other. Every store
/// call is bounded by the configured timeout.
pub struct GameCoordinator {
    store: Arc<dyn GameStateStore>,
    settings: GameSettings,
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl GameCoordinator {
    pub fn new(store: Arc<dyn GameStateStore>, settings: GameSettings) -> Self {
        Self {
            store,
            settings,
            gates: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &GameSettings {
        &self.settings
    }

    /// Create a waiting game with a random secret and no players.
    pub async fn create_game(&self, game_id: &str, capacity: usize) -> Result<GameState, GameError> {
        if capacity == 0 || capacity > self.settings.max_capacity {
            return Err(GameError::MalformedCommand(format!(
                "capacity must be between 1 and {}",
                self.settings.max_capacity
            )));
        }

        let _gate = self.gate(game_id).await;
        if self.try_load(game_id).await?.is_some() {
            return Err(GameError::WrongState(format!(
                "game `{game_id}` already exists"
            )));
        }

        let game = GameState::new(
            capacity,
            self.settings.min_range,
            self.settings.max_range,
            self.draw_secret(),
        );
        self.persist(game_id, &game).await?;
        info!(game_id, capacity, "game created");
        Ok(game)
    }

    /// Seat a player at the end of the turn order.
    pub async fn add_player(
        &self,
        game_id: &str,
        player_id: &str,
        display_name: &str,
    ) -> Result<GameState, GameError> {
        let ((), game) = self
            .mutate(game_id, |game| game.add_player(player_id, display_name))
            .await?;
        debug!(game_id, player_id, players = game.players.len(), "player added");
        Ok(game)
    }

    /// Toggle the ready flag of a player, returning the new flag and state.
    pub async fn set_ready(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<(bool, GameState), GameError> {
        self.mutate(game_id, |game| game.toggle_ready(player_id))
            .await
    }

    pub async fn start_game(&self, game_id: &str) -> Result<GameState, GameError> {
        let ((), game) = self.mutate(game_id, GameState::start).await?;
        info!(game_id, players = game.players.len(), "game started");
        Ok(game)
    }

    /// Record a guess; out-of-range values leave the turn untouched.
    pub async fn guess(
        &self,
        game_id: &str,
        player_id: &str,
        value: i64,
    ) -> Result<GuessOutcome, GameError> {
        let (hint, state) = self
            .mutate(game_id, |game| game.guess(player_id, value))
            .await?;
        if hint == GuessHint::Correct {
            info!(game_id, player_id, round = state.round, "secret number found");
        }
        Ok(GuessOutcome { hint, state })
    }

    /// Voluntary departure, refused while the game is playing.
    pub async fn leave(&self, game_id: &str, player_id: &str) -> Result<LeaveOutcome, GameError> {
        self.remove_player(game_id, player_id, false).await
    }

    /// Departure caused by a disconnect; allowed in every status.
    pub async fn force_leave(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> Result<LeaveOutcome, GameError> {
        self.remove_player(game_id, player_id, true).await
    }

    /// Start a new round, refused while the game is playing.
    pub async fn reset(&self, game_id: &str) -> Result<GameState, GameError> {
        self.reset_round(game_id, false).await
    }

    pub async fn force_reset(&self, game_id: &str) -> Result<GameState, GameError> {
        self.reset_round(game_id, true).await
    }

    /// Current record of a game.
    pub async fn status(&self, game_id: &str) -> Result<GameState, GameError> {
        self.load(game_id).await
    }

    pub async fn health_check(&self) -> Result<(), StorageError> {
        self.bounded("health_check", self.store.health_check()).await
    }

    /// Drop every stored game; used once at startup.
    pub async fn clear_all(&self) -> Result<usize, StorageError> {
        self.bounded("clear_all", self.store.clear_all()).await
    }

    async fn remove_player(
        &self,
        game_id: &str,
        player_id: &str,
        forced: bool,
    ) -> Result<LeaveOutcome, GameError> {
        let _gate = self.gate(game_id).await;
        let mut game = self.load(game_id).await?;
        if !forced && game.status == GameStatus::Playing {
            return Err(GameError::WrongState(
                "cannot leave while the game is playing".into(),
            ));
        }
        if !game.remove_player(player_id) {
            return Ok(LeaveOutcome::NotPresent(game));
        }

        if game.players.is_empty() {
            self.bounded("delete", self.store.delete(game_id)).await?;
            info!(game_id, player_id, forced, "last player left; game deleted");
            return Ok(LeaveOutcome::Emptied);
        }

        self.persist(game_id, &game).await?;
        debug!(game_id, player_id, forced, "player removed");
        Ok(LeaveOutcome::Removed(game))
    }

    async fn reset_round(&self, game_id: &str, forced: bool) -> Result<GameState, GameError> {
        let secret = self.draw_secret();
        let ((), game) = self
            .mutate(game_id, |game| {
                if !forced && game.status == GameStatus::Playing {
                    return Err(GameError::WrongState(
                        "cannot reset while the game is playing".into(),
                    ));
                }
                game.reset(secret);
                Ok(())
            })
            .await?;
        info!(game_id, round = game.round, forced, "game reset");
        Ok(game)
    }

    /// Load, apply, and persist under the game's gate. Nothing is written when `apply` fails.
    async fn mutate<T>(
        &self,
        game_id: &str,
        apply: impl FnOnce(&mut GameState) -> Result<T, GameError>,
    ) -> Result<(T, GameState), GameError> {
        let _gate = self.gate(game_id).await;
        let mut game = self.load(game_id).await?;
        let value = apply(&mut game)?;
        self.persist(game_id, &game).await?;
        Ok((value, game))
    }

    async fn gate(&self, game_id: &str) -> GateGuard<'_> {
        let gate = self.gates.entry(game_id.to_owned()).or_default().clone();
        GateGuard {
            gates: &self.gates,
            game_id: game_id.to_owned(),
            held: Some(gate.lock_owned().await),
        }
    }

    async fn load(&self, game_id: &str) -> Result<GameState, GameError> {
        self.try_load(game_id)
            .await?
            .ok_or_else(|| GameError::NotFound(game_id.to_owned()))
    }

    async fn try_load(&self, game_id: &str) -> Result<Option<GameState>, StorageError> {
        let record = self.bounded("load", self.store.load(game_id)).await?;
        Ok(record.map(Into::into))
    }

    async fn persist(&self, game_id: &str, game: &GameState) -> Result<(), StorageError> {
        let record = GameRecord::from(game.clone());
        let ttl = self.settings.record_ttl;
        self.bounded("save", self.store.save(game_id, record, ttl))
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: BoxFuture<'static, StorageResult<T>>,
    ) -> StorageResult<T> {
        bounded(self.settings.store_timeout, operation, call).await
    }

    fn draw_secret(&self) -> i64 {
        rand::rng().random_range(self.settings.min_range..=self.settings.max_range)
    }
}

/// Exclusive access to one game. The map entry is dropped with the last holder,
/// so unknown or expired identifiers leave nothing behind.
struct GateGuard<'a> {
    gates: &'a DashMap<String, Arc<Mutex<()>>>,
    game_id: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        // Waiters hold their own clone, which keeps the entry alive for them.
        self.held.take();
        self.gates
            .remove_if(&self.game_id, |_, gate| Arc::strong_count(gate) == 1);
    }
}

async fn bounded<T>(
    after: Duration,
    operation: &'static str,
    call: BoxFuture<'static, StorageResult<T>>,
) -> StorageResult<T> {
    match timeout(after, call).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::timed_out(operation, after)),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::dao::game_store::memory::MemoryGameStore;

    /// Coordinator over a memory store, plus a game `id` seeded with secret 42.
    pub(crate) async fn seeded(id: &str, capacity: usize) -> (Arc<GameCoordinator>, MemoryGameStore) {
        let store = MemoryGameStore::new();
        let settings = GameSettings::default();
        let game = GameState::new(capacity, settings.min_range, settings.max_range, 42);
        store
            .save(id, game.into(), settings.record_ttl)
            .await
            .unwrap();
        let coordinator = Arc::new(GameCoordinator::new(Arc::new(store.clone()), settings));
        (coordinator, store)
    }

    struct StalledStore;

    impl GameStateStore for StalledStore {
        fn load(&self, _: &str) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
            Box::pin(futures::future::pending())
        }
        fn save(&self, _: &str, _: GameRecord, _: Duration) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(futures::future::pending())
        }
        fn delete(&self, _: &str) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(futures::future::pending())
        }
        fn clear_all(&self) -> BoxFuture<'static, StorageResult<usize>> {
            Box::pin(futures::future::pending())
        }
        fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(futures::future::pending())
        }
    }

    #[tokio::test]
    async fn two_player_scenario() {
        let (coordinator, _) = seeded("g", 2).await;
        coordinator.add_player("g", "a", "Ada").await.unwrap();
        coordinator.add_player("g", "b", "Bob").await.unwrap();

        let err = coordinator.start_game("g").await.unwrap_err();
        assert!(matches!(err, GameError::NotAllReady));
        assert_eq!(coordinator.status("g").await.unwrap().status, GameStatus::Waiting);

        let err = coordinator.add_player("g", "c", "Cy").await.unwrap_err();
        assert!(matches!(err, GameError::RoomFull { capacity: 2 }));

        assert!(coordinator.set_ready("g", "a").await.unwrap().0);
        assert!(coordinator.set_ready("g", "b").await.unwrap().0);
        let game = coordinator.start_game("g").await.unwrap();
        assert_eq!(game.status, GameStatus::Playing);

        let outcome = coordinator.guess("g", "a", 37).await.unwrap();
        assert_eq!(outcome.hint, GuessHint::TooLow);
        assert!(!outcome.won());
        assert_eq!(outcome.state.status, GameStatus::Playing);
        assert_eq!(outcome.state.current_player().unwrap().id, "b");

        let outcome = coordinator.guess("g", "b", 42).await.unwrap();
        assert!(outcome.won());
        assert_eq!(outcome.state.status, GameStatus::Finished);
        assert_eq!(outcome.state.player("b").unwrap().score, 1);

        let err = coordinator.guess("g", "a", 42).await.unwrap_err();
        assert!(matches!(err, GameError::WrongState(_)));
    }

    #[tokio::test]
    async fn last_leave_deletes_the_record() {
        let (coordinator, store) = seeded("g", 3).await;
        coordinator.add_player("g", "a", "Ada").await.unwrap();
        coordinator.add_player("g", "b", "Bob").await.unwrap();

        match coordinator.leave("g", "a").await.unwrap() {
            LeaveOutcome::Removed(game) => {
                assert_eq!(game.players.len(), 1);
                assert_eq!(game.players[0].turn_order, 0);
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert!(matches!(
            coordinator.leave("g", "ghost").await.unwrap(),
            LeaveOutcome::NotPresent(_)
        ));
        assert!(matches!(
            coordinator.force_leave("g", "b").await.unwrap(),
            LeaveOutcome::Emptied
        ));

        assert!(store.is_empty());
        let err = coordinator.status("g").await.unwrap_err();
        assert!(matches!(err, GameError::NotFound(id) if id == "g"));
    }

    #[tokio::test]
    async fn voluntary_leave_and_reset_are_refused_while_playing() {
        let (coordinator, _) = seeded("g", 2).await;
        coordinator.add_player("g", "a", "Ada").await.unwrap();
        coordinator.set_ready("g", "a").await.unwrap();
        coordinator.start_game("g").await.unwrap();

        assert!(matches!(
            coordinator.leave("g", "a").await.unwrap_err(),
            GameError::WrongState(_)
        ));
        assert!(matches!(
            coordinator.reset("g").await.unwrap_err(),
            GameError::WrongState(_)
        ));

        let game = coordinator.force_reset("g").await.unwrap();
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.round, 1);
        assert!(!game.players[0].is_ready);
        assert!((1..=100).contains(&game.secret_number));
    }

    #[tokio::test]
    async fn create_game_rejects_existing_ids_and_bad_capacity() {
        let coordinator =
            GameCoordinator::new(Arc::new(MemoryGameStore::new()), GameSettings::default());
        let game = coordinator.create_game("fresh", 5).await.unwrap();
        assert_eq!(game.status, GameStatus::Waiting);
        assert!(game.players.is_empty());
        assert!((1..=100).contains(&game.secret_number));

        assert!(matches!(
            coordinator.create_game("fresh", 5).await.unwrap_err(),
            GameError::WrongState(_)
        ));
        assert!(matches!(
            coordinator.create_game("other", 0).await.unwrap_err(),
            GameError::MalformedCommand(_)
        ));
    }

    #[tokio::test]
    async fn missing_games_are_not_found() {
        let coordinator =
            GameCoordinator::new(Arc::new(MemoryGameStore::new()), GameSettings::default());
        assert!(matches!(
            coordinator.add_player("nope", "a", "Ada").await.unwrap_err(),
            GameError::NotFound(_)
        ));
        assert!(matches!(
            coordinator.force_leave("nope", "a").await.unwrap_err(),
            GameError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn concurrent_guesses_from_one_player_are_serialized() {
        let (coordinator, _) = seeded("g", 2).await;
        coordinator.add_player("g", "a", "Ada").await.unwrap();
        coordinator.add_player("g", "b", "Bob").await.unwrap();
        coordinator.set_ready("g", "a").await.unwrap();
        coordinator.set_ready("g", "b").await.unwrap();
        coordinator.start_game("g").await.unwrap();

        let first = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.guess("g", "a", 10).await }
        });
        let second = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.guess("g", "a", 20).await }
        });
        let results = [first.await.unwrap(), second.await.unwrap()];

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .any(|r| matches!(r, Err(GameError::AlreadyGuessed)))
        );
        let game = coordinator.status("g").await.unwrap();
        assert_eq!(game.current_turn_index, 1);
    }

    #[tokio::test]
    async fn gates_do_not_outlive_their_operations() {
        let (coordinator, _) = seeded("g", 2).await;
        for n in 0..1000 {
            let id = format!("bogus{n}");
            assert!(matches!(
                coordinator.add_player(&id, "a", "Ada").await.unwrap_err(),
                GameError::NotFound(_)
            ));
        }
        assert_eq!(coordinator.gates.len(), 0);

        coordinator.add_player("g", "a", "Ada").await.unwrap();
        coordinator.set_ready("g", "a").await.unwrap();
        assert_eq!(coordinator.gates.len(), 0);
    }

    #[tokio::test]
    async fn gate_survives_while_another_caller_waits() {
        let (coordinator, _) = seeded("g", 2).await;
        let first = coordinator.gate("g").await;
        let waiter = tokio::spawn({
            let coordinator = coordinator.clone();
            async move { coordinator.add_player("g", "a", "Ada").await }
        });
        tokio::task::yield_now().await;
        while Arc::strong_count(coordinator.gates.get("g").unwrap().value()) < 3 {
            tokio::task::yield_now().await;
        }

        drop(first);
        assert_eq!(coordinator.gates.len(), 1);
        waiter.await.unwrap().unwrap();
        assert_eq!(coordinator.gates.len(), 0);
    }

    #[tokio::test]
    async fn stalled_store_surfaces_as_unavailable() {
        let settings = GameSettings {
            store_timeout: Duration::from_millis(20),
            ..GameSettings::default()
        };
        let coordinator = GameCoordinator::new(Arc::new(StalledStore), settings);
        let err = coordinator.status("g").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(
            err,
            GameError::StoreUnavailable(StorageError::Timeout { operation: "load", .. })
        ));
    }
}
