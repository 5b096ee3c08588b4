use std::{fmt, time::Duration};

use axum::{
    body::Bytes,
    extract::ws::{Message, Utf8Bytes, WebSocket},
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at, sleep, timeout},
};
use tracing::{debug, info, warn};

use crate::{
    config::ConnectionSettings,
    dao::models::{GameResultRecord, ParticipantRecord},
    dto::ws::{ANONYMOUS_PLAYER, Command, ConnectQuery, InboundEnvelope, RoomMessage},
    error::GameError,
    services::{coordinator::LeaveOutcome, events},
    state::{
        SharedState,
        connection::{Connection, ConnectionId, ConnectionPhase},
        game::GameState,
        hub::HubClosed,
    },
};

/// Identity of the player behind a socket, as verified by the upgrade handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub game_id: String,
    pub player_id: String,
    pub player_name: String,
}

impl From<ConnectQuery> for PlayerIdentity {
    fn from(value: ConnectQuery) -> Self {
        let player_name = value
            .player_name
            .map(|name| name.trim().to_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| ANONYMOUS_PLAYER.to_owned());
        Self {
            game_id: value.game_id,
            player_id: value.player_id,
            player_name,
        }
    }
}

/// Handle the full lifecycle of one game socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket, identity: PlayerIdentity) {
    let (sender, receiver) = socket.split();
    pump(state, identity, receiver, sender).await;
}

/// Run a connection over any frame stream and sink until either side gives up.
async fn pump<R, E, W>(
    state: SharedState,
    identity: PlayerIdentity,
    mut receiver: R,
    sender: W,
)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
    W: Sink<Message> + Unpin + Send + 'static,
    W::Error: fmt::Display,
{
    let settings = state.config().connection.clone();
    let (outbound_tx, outbound_rx) = mpsc::channel::<Utf8Bytes>(settings.outbound_queue_capacity);

    // Dedicated writer task keeps outbound frames and keep-alives flowing while we await inbound frames.
    let mut writer_task = tokio::spawn(write_loop(sender, outbound_rx, settings.clone()));

    let mut session = Session::new(state, identity);
    session.authenticated();
    if let Err(err) = session.attach(outbound_tx).await {
        warn!(error = %err, "cannot register connection");
        finalize(writer_task, false, settings.write_timeout).await;
        return;
    }

    let writer_done = read_loop(
        &mut receiver,
        &mut session,
        &mut writer_task,
        settings.idle_timeout,
    )
    .await;

    session.close().await;
    finalize(writer_task, writer_done, settings.write_timeout).await;
}

/// Feed inbound frames to the session; returns whether the writer already finished.
async fn read_loop<R, E>(
    receiver: &mut R,
    session: &mut Session,
    writer_task: &mut JoinHandle<()>,
    idle_timeout: Duration,
) -> bool
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    loop {
        let frame = tokio::select! {
            _ = &mut *writer_task => {
                debug!(connection_id = %session.connection_id(), "writer stopped; closing connection");
                return true;
            }
            frame = timeout(idle_timeout, receiver.next()) => frame,
        };

        match frame {
            Err(_) => {
                info!(
                    connection_id = %session.connection_id(),
                    timeout = ?idle_timeout,
                    "connection idle; closing"
                );
                return false;
            }
            Ok(None) => return false,
            Ok(Some(Err(err))) => {
                debug!(connection_id = %session.connection_id(), error = %err, "websocket receive error");
                return false;
            }
            Ok(Some(Ok(Message::Text(text)))) => session.handle_text(text.as_str()).await,
            Ok(Some(Ok(Message::Binary(bytes)))) => match std::str::from_utf8(&bytes) {
                Ok(text) => session.handle_text(text).await,
                Err(_) => {
                    warn!(connection_id = %session.connection_id(), "ignoring non UTF-8 binary frame")
                }
            },
            Ok(Some(Ok(Message::Close(_)))) => return false,
            // Keep-alive traffic only refreshes the idle deadline.
            Ok(Some(Ok(Message::Ping(_) | Message::Pong(_)))) => {}
        }
    }
}

/// Drain the outbound queue into the sink, pinging when the line goes quiet.
async fn write_loop<W>(
    mut sender: W,
    mut outbound_rx: mpsc::Receiver<Utf8Bytes>,
    settings: ConnectionSettings,
)
where
    W: Sink<Message> + Unpin,
    W::Error: fmt::Display,
{
    let mut keepalive = interval_at(
        Instant::now() + settings.ping_interval,
        settings.ping_interval,
    );
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let message = tokio::select! {
            frame = outbound_rx.recv() => match frame {
                Some(text) => Message::Text(text),
                None => {
                    let _ = timeout(settings.write_timeout, sender.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = keepalive.tick() => Message::Ping(Bytes::new()),
        };
        let is_ping = matches!(message, Message::Ping(_));

        match timeout(settings.write_timeout, sender.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                debug!(error = %err, "websocket write failed");
                break;
            }
            Err(_) => {
                warn!(timeout = ?settings.write_timeout, "websocket write timed out");
                break;
            }
        }
        if !is_ping {
            keepalive.reset();
        }
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, writer_done: bool, grace: Duration) {
    if writer_done {
        return;
    }
    if timeout(grace, writer_task).await.is_err() {
        warn!("writer task did not stop in time");
    }
}

/// Command dispatch for one connection, independent of the transport.
pub struct Session {
    state: SharedState,
    identity: PlayerIdentity,
    connection_id: ConnectionId,
    phase: ConnectionPhase,
    left_voluntarily: bool,
}

impl Session {
    pub fn new(state: SharedState, identity: PlayerIdentity) -> Self {
        Self {
            state,
            identity,
            connection_id: ConnectionId::nil(),
            phase: ConnectionPhase::Connected,
            left_voluntarily: false,
        }
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.phase
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Record that the upgrade handshake vouched for the identity.
    pub fn authenticated(&mut self) {
        self.phase.advance(ConnectionPhase::Authenticated);
    }

    /// Register in the hub with `tx` as outbound queue and schedule the first roster refresh.
    pub async fn attach(&mut self, tx: mpsc::Sender<Utf8Bytes>) -> Result<(), HubClosed> {
        let identity = &self.identity;
        let connection = Connection::new(
            identity.game_id.clone(),
            identity.player_id.clone(),
            identity.player_name.clone(),
            tx,
        );
        self.connection_id = connection.id;
        self.state.hub().join(connection).await?;
        self.phase.advance(ConnectionPhase::Active);
        info!(
            game_id = %identity.game_id,
            player_id = %identity.player_id,
            connection_id = %self.connection_id,
            "player connected"
        );

        let delay = self.state.config().hub.join_status_delay;
        schedule_room_status(self.state.clone(), identity.game_id.clone(), delay);
        Ok(())
    }

    /// Decode and dispatch one text frame.
    ///
    /// Undecodable frames are logged and ignored; rule violations are
    /// reported to the whole room as `error` events.
    pub async fn handle_text(&mut self, text: &str) {
        let envelope = match serde_json::from_str::<InboundEnvelope>(text) {
            Ok(envelope) => InboundEnvelope {
                game_id: self.identity.game_id.clone(),
                from: self.identity.player_id.clone(),
                ..envelope
            },
            Err(err) => {
                warn!(connection_id = %self.connection_id, error = %err, "ignoring undecodable frame");
                return;
            }
        };

        let result = match Command::decode(&envelope) {
            Ok(command) => self.dispatch(command, envelope).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(()) => {}
            Err(err @ GameError::MalformedCommand(_)) => {
                warn!(connection_id = %self.connection_id, error = %err, "ignoring malformed command");
            }
            Err(err) => {
                warn!(
                    game_id = %self.identity.game_id,
                    player_id = %self.identity.player_id,
                    error = %err,
                    transient = err.is_transient(),
                    "command rejected"
                );
                self.broadcast(events::error(&self.identity.game_id, err.to_string()))
                    .await;
            }
        }
    }

    async fn dispatch(&mut self, command: Command, envelope: InboundEnvelope) -> Result<(), GameError> {
        let coordinator = self.state.coordinator();
        let PlayerIdentity {
            game_id,
            player_id,
            player_name,
        } = &self.identity;

        match command {
            Command::Chat(payload) => {
                let text = events::chat_text(&payload);
                self.broadcast(events::chat(game_id, player_name, text)).await;
            }
            Command::Auth => {
                self.broadcast(events::auth(game_id, player_name)).await;
            }
            Command::JoinGame => {
                let game = coordinator.add_player(game_id, player_id, player_name).await?;
                // Seated again: a later disconnect must free the seat.
                self.left_voluntarily = false;
                self.broadcast(events::player_joined(game_id, player_name, game.players.len()))
                    .await;
                self.broadcast(events::room_status(game_id, &game, events::status_line(&game)))
                    .await;
            }
            Command::LeftGame => {
                let outcome = coordinator.leave(game_id, player_id).await?;
                self.left_voluntarily = true;
                match outcome {
                    LeaveOutcome::Removed(game) => {
                        self.broadcast(events::player_left(game_id, player_name, Some(&game)))
                            .await;
                    }
                    LeaveOutcome::Emptied => {
                        self.broadcast(events::player_left(game_id, player_name, None))
                            .await;
                    }
                    LeaveOutcome::NotPresent(_) => {}
                }
            }
            Command::StartGame => {
                let game = coordinator.start_game(game_id).await?;
                self.broadcast(events::game_started(game_id, &game)).await;
                self.announce_turn(&game).await;
            }
            Command::Guess(value) => {
                let outcome = coordinator.guess(game_id, player_id, value).await?;
                if outcome.won() {
                    self.broadcast(events::game_over(game_id, player_name, &outcome.state))
                        .await;
                    self.report_win(&outcome.state);
                } else {
                    self.broadcast(events::player_guess(
                        game_id,
                        player_name,
                        value,
                        outcome.hint,
                    ))
                    .await;
                    self.announce_turn(&outcome.state).await;
                }
            }
            Command::Ready => {
                let (ready, game) = coordinator.set_ready(game_id, player_id).await?;
                let message = if ready {
                    format!("{player_name} is ready ({})", events::status_line(&game))
                } else {
                    format!("{player_name} is no longer ready ({})", events::status_line(&game))
                };
                self.broadcast(events::room_status(game_id, &game, message))
                    .await;
            }
            Command::Reset => {
                let game = coordinator.reset(game_id).await?;
                self.broadcast_reset(&game).await;
            }
            Command::Relay => {
                self.broadcast(envelope).await;
            }
        }
        Ok(())
    }

    /// Deregister from the hub and, unless the player left on purpose, free their seat.
    ///
    /// Store failures here are logged only.
    pub async fn close(mut self) {
        if !self.phase.advance(ConnectionPhase::Closed) {
            return;
        }
        let PlayerIdentity {
            game_id,
            player_id,
            player_name,
        } = self.identity.clone();

        if let Err(err) = self.state.hub().leave(&game_id, self.connection_id).await {
            warn!(connection_id = %self.connection_id, error = %err, "cannot deregister connection");
        }
        info!(%game_id, %player_id, connection_id = %self.connection_id, "player disconnected");

        if self.left_voluntarily {
            return;
        }

        let coordinator = self.state.coordinator();
        match coordinator.force_leave(&game_id, &player_id).await {
            Ok(LeaveOutcome::Removed(game)) => {
                self.broadcast(events::player_left(&game_id, &player_name, Some(&game)))
                    .await;
                match coordinator.force_reset(&game_id).await {
                    Ok(game) => self.broadcast_reset(&game).await,
                    Err(err) => {
                        warn!(%game_id, error = %err, "reset after disconnect failed");
                    }
                }
            }
            Ok(LeaveOutcome::Emptied) => {
                debug!(%game_id, "disconnect emptied the game");
            }
            Ok(LeaveOutcome::NotPresent(_)) | Err(GameError::NotFound(_)) => {}
            Err(err) => {
                warn!(%game_id, %player_id, error = %err, "cleanup after disconnect failed");
            }
        }
    }

    async fn broadcast_reset(&self, game: &GameState) {
        let game_id = &self.identity.game_id;
        self.broadcast(events::game_reset(game_id, game)).await;
        self.broadcast(events::room_status(game_id, game, events::status_line(game)))
            .await;
    }

    async fn announce_turn(&self, game: &GameState) {
        if let Some(event) = events::player_turn(&self.identity.game_id, game) {
            self.broadcast(event).await;
        }
    }

    async fn broadcast(&self, message: impl Into<RoomMessage>) {
        if let Err(err) = self
            .state
            .hub()
            .broadcast(&self.identity.game_id, message)
            .await
        {
            warn!(game_id = %self.identity.game_id, error = %err, "broadcast dropped");
        }
    }

    /// Hand the finished round to the result sink without holding up the game.
    fn report_win(&self, game: &GameState) {
        let results = self.state.results();
        let game_id = self.identity.game_id.clone();
        let result = GameResultRecord::from_winner(&game_id, &self.identity.player_id, game);
        let participants = ParticipantRecord::for_game(&game_id, game);

        tokio::spawn(async move {
            if let Err(err) = results.record_result(result).await {
                warn!(%game_id, error = %err, "failed to record game result");
            }
            for participant in participants {
                let player_id = participant.player_id.clone();
                if let Err(err) = results.record_participant(participant).await {
                    warn!(%game_id, %player_id, error = %err, "failed to record participant");
                }
            }
        });
    }
}

/// Send a roster refresh to `game_id` after `delay`; missing games are skipped.
fn schedule_room_status(state: SharedState, game_id: String, delay: Duration) {
    tokio::spawn(async move {
        sleep(delay).await;
        match state.coordinator().status(&game_id).await {
            Ok(game) => {
                let event = events::room_status(&game_id, &game, events::status_line(&game));
                let _ = state.hub().broadcast(&game_id, event).await;
            }
            Err(GameError::NotFound(_)) => {}
            Err(err) => warn!(%game_id, error = %err, "failed to load game for room status"),
        }
    });
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::Value;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            game_store::{GameStateStore, memory::MemoryGameStore},
            result_sink::testing::RecordingResultSink,
        },
        state::{AppState, game::GameStatus},
    };

    struct Harness {
        state: SharedState,
        sink: RecordingResultSink,
    }

    impl Harness {
        /// Game `g` with secret 42 and the given capacity, no players seated.
        async fn new(capacity: usize) -> Self {
            Self::with_config(capacity, |_| {}).await
        }

        async fn with_config(capacity: usize, configure: impl FnOnce(&mut AppConfig)) -> Self {
            let mut config = AppConfig::default();
            config.hub.join_status_delay = Duration::from_secs(30);
            configure(&mut config);
            let store = MemoryGameStore::new();
            let game = GameState::new(capacity, 1, 100, 42);
            store
                .save("g", game.into(), config.game.record_ttl)
                .await
                .unwrap();
            let sink = RecordingResultSink::default();
            let state = AppState::new(config, Arc::new(store), Arc::new(sink.clone()));
            Self { state, sink }
        }

        async fn connect(&self, player_id: &str, name: &str) -> (Session, mpsc::Receiver<Utf8Bytes>) {
            let (tx, rx) = mpsc::channel(64);
            let mut session = Session::new(self.state.clone(), identity(player_id, name));
            session.authenticated();
            session.attach(tx).await.unwrap();
            (session, rx)
        }
    }

    fn identity(player_id: &str, name: &str) -> PlayerIdentity {
        PlayerIdentity {
            game_id: "g".into(),
            player_id: player_id.into(),
            player_name: name.into(),
        }
    }

    /// Collect frames until the queue stays quiet.
    async fn drain(rx: &mut mpsc::Receiver<Utf8Bytes>) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = tokio::time::timeout(Duration::from_millis(150), rx.recv()).await {
            frames.push(serde_json::from_str(frame.as_str()).unwrap());
        }
        frames
    }

    fn types(frames: &[Value]) -> Vec<&str> {
        frames
            .iter()
            .map(|frame| frame["type"].as_str().unwrap_or_default())
            .collect()
    }

    #[tokio::test]
    async fn incorrect_guess_announces_hint_then_next_turn() {
        let harness = Harness::new(2).await;
        let (mut ada, mut ada_rx) = harness.connect("a", "Ada").await;
        let (mut bob, _bob_rx) = harness.connect("b", "Bob").await;
        assert_eq!(ada.phase(), ConnectionPhase::Active);

        ada.handle_text(r#"{"type":"join_game"}"#).await;
        bob.handle_text(r#"{"type":"join_game"}"#).await;
        ada.handle_text(r#"{"type":"start_game"}"#).await;
        let frames = drain(&mut ada_rx).await;
        let last = frames.last().unwrap();
        assert_eq!(last["type"], "error");
        assert_eq!(last["message"], "not every player is ready");

        ada.handle_text(r#"{"type":"player_ready"}"#).await;
        bob.handle_text(r#"{"type":"player_ready"}"#).await;
        ada.handle_text(r#"{"type":"start_game"}"#).await;
        ada.handle_text(r#"{"type":"player_guess","message":"37"}"#).await;

        let frames = drain(&mut ada_rx).await;
        assert_eq!(
            types(&frames),
            vec![
                "room_status_update",
                "room_status_update",
                "game_started",
                "player_turn",
                "player_guess",
                "player_turn",
            ]
        );
        assert!(frames[4]["message"].as_str().unwrap().ends_with("too small"));
        assert_eq!(frames[5]["playerName"], "Bob");
        assert_eq!(frames[5]["gameInfo"]["currentTurn"], "b");

        let game = harness.state.coordinator().status("g").await.unwrap();
        assert_eq!(game.status, GameStatus::Playing);
    }

    #[tokio::test]
    async fn winning_guess_is_reported_once() {
        let harness = Harness::new(2).await;
        let (mut ada, mut ada_rx) = harness.connect("a", "Ada").await;
        ada.handle_text(r#"{"type":"join_game"}"#).await;
        ada.handle_text(r#"{"type":"player_ready"}"#).await;
        ada.handle_text(r#"{"type":"start_game"}"#).await;
        ada.handle_text(r#"{"type":"player_guess","message":42.7}"#).await;
        ada.handle_text(r#"{"type":"player_guess","message":42}"#).await;

        let frames = drain(&mut ada_rx).await;
        let kinds = types(&frames);
        let over = kinds.iter().position(|kind| *kind == "game_over").unwrap();
        assert_eq!(kinds[over + 1], "error");
        assert_eq!(frames[over]["playerName"], "Ada");

        let results = harness.sink.results.lock().unwrap().clone();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].winner_id, "a");
        assert_eq!(results[0].secret_number, 42);
        assert_eq!(harness.sink.participants.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_frames_are_ignored() {
        let harness = Harness::new(2).await;
        let (mut ada, mut ada_rx) = harness.connect("a", "Ada").await;
        drain(&mut ada_rx).await;

        ada.handle_text("not json").await;
        ada.handle_text(r#"{"type":"player_guess","message":"forty"}"#).await;
        ada.handle_text(r#"{"type":"chat","message":{"text":"still here"}}"#).await;

        let frames = drain(&mut ada_rx).await;
        assert_eq!(types(&frames), vec!["chat"]);
        assert_eq!(frames[0]["message"], "still here");
        assert_eq!(frames[0]["from"], "Ada");
    }

    #[tokio::test]
    async fn unknown_types_are_relayed_with_server_identity() {
        let harness = Harness::new(2).await;
        let (mut ada, _ada_rx) = harness.connect("a", "Ada").await;
        let (_bob, mut bob_rx) = harness.connect("b", "Bob").await;
        drain(&mut bob_rx).await;

        ada.handle_text(r#"{"type":"emoji","gameId":"other","from":"mallory","message":":)"}"#)
            .await;

        let frames = drain(&mut bob_rx).await;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "emoji");
        assert_eq!(frames[0]["gameId"], "g");
        assert_eq!(frames[0]["from"], "a");
        assert_eq!(frames[0]["message"], ":)");
    }

    #[tokio::test]
    async fn disconnect_frees_the_seat_and_resets_the_game() {
        let harness = Harness::new(3).await;
        let (mut ada, _ada_rx) = harness.connect("a", "Ada").await;
        let (mut bob, mut bob_rx) = harness.connect("b", "Bob").await;
        ada.handle_text(r#"{"type":"join_game"}"#).await;
        bob.handle_text(r#"{"type":"join_game"}"#).await;
        ada.handle_text(r#"{"type":"player_ready"}"#).await;
        bob.handle_text(r#"{"type":"player_ready"}"#).await;
        ada.handle_text(r#"{"type":"start_game"}"#).await;
        drain(&mut bob_rx).await;

        ada.close().await;
        let frames = drain(&mut bob_rx).await;
        let kinds = types(&frames);
        assert_eq!(
            &kinds[..3],
            &["player_left", "game_reset", "room_status_update"]
        );

        let game = harness.state.coordinator().status("g").await.unwrap();
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.round, 1);
        assert_eq!(game.players.len(), 1);

        bob.close().await;
        assert!(matches!(
            harness.state.coordinator().status("g").await,
            Err(GameError::NotFound(_))
        ));
        assert!(harness.state.hub().rooms().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn voluntary_leave_skips_forced_reset() {
        let harness = Harness::new(3).await;
        let (mut ada, _ada_rx) = harness.connect("a", "Ada").await;
        let (mut bob, mut bob_rx) = harness.connect("b", "Bob").await;
        ada.handle_text(r#"{"type":"join_game"}"#).await;
        bob.handle_text(r#"{"type":"join_game"}"#).await;
        drain(&mut bob_rx).await;

        ada.handle_text(r#"{"type":"left_game"}"#).await;
        ada.close().await;

        let frames = drain(&mut bob_rx).await;
        let kinds = types(&frames);
        assert_eq!(kinds[0], "player_left");
        assert!(!kinds.contains(&"game_reset"));
        assert_eq!(frames[0]["gameInfo"]["currentPlayers"], 1);
    }

    #[tokio::test]
    async fn disconnect_after_rejoining_frees_the_seat() {
        let harness = Harness::new(3).await;
        let (mut ada, _ada_rx) = harness.connect("a", "Ada").await;
        let (mut bob, _bob_rx) = harness.connect("b", "Bob").await;
        ada.handle_text(r#"{"type":"join_game"}"#).await;
        bob.handle_text(r#"{"type":"join_game"}"#).await;

        ada.handle_text(r#"{"type":"left_game"}"#).await;
        ada.handle_text(r#"{"type":"join_game"}"#).await;
        ada.close().await;

        let game = harness.state.coordinator().status("g").await.unwrap();
        let seated: Vec<_> = game.players.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(seated, vec!["b"]);
    }

    type Inbound = futures::channel::mpsc::UnboundedSender<Result<Message, std::convert::Infallible>>;

    /// Transport settings short enough for tests; the caller tweaks the rest.
    async fn transport_harness(configure: impl FnOnce(&mut ConnectionSettings)) -> Harness {
        Harness::with_config(3, |config| {
            config.connection.idle_timeout = Duration::from_secs(10);
            config.connection.ping_interval = Duration::from_secs(3600);
            config.connection.write_timeout = Duration::from_secs(5);
            configure(&mut config.connection);
        })
        .await
    }

    /// Seat `a` and run a pump for it over in-memory channels.
    async fn spawn_pump<W>(harness: &Harness, sink: W) -> (Inbound, JoinHandle<()>)
    where
        W: Sink<Message> + Unpin + Send + 'static,
        W::Error: fmt::Display,
    {
        harness
            .state
            .coordinator()
            .add_player("g", "a", "Ada")
            .await
            .unwrap();
        let (inbound_tx, inbound_rx) = futures::channel::mpsc::unbounded();
        let task = tokio::spawn(pump(harness.state.clone(), identity("a", "Ada"), inbound_rx, sink));
        (inbound_tx, task)
    }

    async fn assert_seat_freed(harness: &Harness) {
        assert!(matches!(
            harness.state.coordinator().status("g").await,
            Err(GameError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn idle_connection_is_closed() {
        let harness = transport_harness(|settings| {
            settings.idle_timeout = Duration::from_millis(100);
        })
        .await;
        let (sink, outbound) = futures::channel::mpsc::unbounded::<Message>();
        let (_inbound, task) = spawn_pump(&harness, sink).await;

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pump stops once idle")
            .unwrap();

        let frames: Vec<Message> = outbound.collect().await;
        assert!(matches!(frames.first(), Some(Message::Text(_))));
        assert!(matches!(frames.last(), Some(Message::Close(None))));
        assert_seat_freed(&harness).await;
    }

    #[tokio::test]
    async fn quiet_line_gets_a_keepalive_ping() {
        let harness = transport_harness(|settings| {
            settings.ping_interval = Duration::from_millis(50);
        })
        .await;
        let (sink, mut outbound) = futures::channel::mpsc::unbounded::<Message>();
        let (inbound, task) = spawn_pump(&harness, sink).await;

        let joined = tokio::time::timeout(Duration::from_secs(1), outbound.next()).await;
        assert!(matches!(joined, Ok(Some(Message::Text(_)))));
        let ping = tokio::time::timeout(Duration::from_secs(1), outbound.next()).await;
        assert!(matches!(ping, Ok(Some(Message::Ping(_)))));

        // Client pongs keep the reader alive; ending the stream closes the pump.
        inbound
            .unbounded_send(Ok(Message::Pong(Bytes::new())))
            .unwrap();
        drop(inbound);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pump stops when the client goes away")
            .unwrap();
        assert_seat_freed(&harness).await;
    }

    #[tokio::test]
    async fn failed_write_ends_the_pump() {
        let harness = transport_harness(|_| {}).await;
        let (sink, outbound) = futures::channel::mpsc::unbounded::<Message>();
        drop(outbound);
        let (_inbound, task) = spawn_pump(&harness, sink).await;

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pump stops once the writer fails")
            .unwrap();
        assert_seat_freed(&harness).await;
    }

    #[tokio::test]
    async fn stalled_write_times_out() {
        let harness = transport_harness(|settings| {
            settings.write_timeout = Duration::from_millis(100);
        })
        .await;
        // Zero-buffer channel: one frame fits, the next blocks until read.
        let (sink, _outbound) = futures::channel::mpsc::channel::<Message>(0);
        let (inbound, task) = spawn_pump(&harness, sink).await;

        inbound
            .unbounded_send(Ok(Message::Text(r#"{"type":"chat","message":"hi"}"#.into())))
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("pump stops once a write times out")
            .unwrap();
        assert_seat_freed(&harness).await;
    }

    #[tokio::test]
    async fn slow_consumer_is_dropped_and_its_reader_stops() {
        let harness = transport_harness(|settings| {
            settings.outbound_queue_capacity = 1;
        })
        .await;
        let (sink, mut outbound) = futures::channel::mpsc::channel::<Message>(0);
        let (_inbound, task) = spawn_pump(&harness, sink).await;

        let hub = harness.state.hub();
        let mut dropped = false;
        for _ in 0..100 {
            hub.broadcast("g", events::chat("g", "Bob", "flood")).await.unwrap();
            if hub.rooms().await.unwrap().is_empty() {
                dropped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dropped, "hub never dropped the slow connection");

        // Unblock the writer: it flushes what was queued, then says goodbye.
        let frames: Vec<Message> = tokio::time::timeout(Duration::from_secs(2), outbound.by_ref().collect())
            .await
            .expect("writer finishes");
        assert!(matches!(frames.last(), Some(Message::Close(None))));

        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("reader stops with the writer")
            .unwrap();
        assert_seat_freed(&harness).await;
    }

    #[tokio::test]
    async fn connect_query_defaults_the_name() {
        let identity = PlayerIdentity::from(ConnectQuery {
            game_id: "g".into(),
            player_id: "p".into(),
            player_name: Some("  ".into()),
        });
        assert_eq!(identity.player_name, "anonymous");
    }
}
