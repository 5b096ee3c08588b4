//! Room registry actor: a single task owns every [`Room`] and performs broadcast fan-out.

use std::{collections::HashMap, sync::Arc, time::SystemTime};

use axum::extract::ws::Utf8Bytes;
use thiserror::Error;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    time::sleep,
};
use tracing::{debug, error, info, warn};

use super::{
    connection::{Connection, ConnectionId},
    room::Room,
};
use crate::{
    config::HubSettings, dto::ws::RoomMessage, error::GameError,
    services::coordinator::GameCoordinator, services::events,
};

/// Raised when the dispatch loop is no longer running.
#[derive(Debug, Error)]
#[error("room hub is not running")]
pub struct HubClosed;

/// Point-in-time description of one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSnapshot {
    pub id: String,
    pub connections: usize,
    pub created_at: SystemTime,
}

struct LeaveRequest {
    room_id: String,
    connection_id: ConnectionId,
}

struct Broadcast {
    room_id: String,
    message: RoomMessage,
}

/// Cloneable entry point to the hub task.
///
/// The task stops once every handle is dropped.
#[derive(Clone)]
pub struct HubHandle {
    join_tx: mpsc::Sender<Connection>,
    leave_tx: mpsc::Sender<LeaveRequest>,
    broadcast_tx: mpsc::Sender<Broadcast>,
    snapshot_tx: mpsc::Sender<oneshot::Sender<Vec<RoomSnapshot>>>,
}

impl HubHandle {
    /// Register `connection` under its room, creating the room if needed.
    pub async fn join(&self, connection: Connection) -> Result<(), HubClosed> {
        self.join_tx.send(connection).await.map_err(|_| HubClosed)
    }

    /// Detach a connection and close its outbound queue.
    pub async fn leave(&self, room_id: &str, connection_id: ConnectionId) -> Result<(), HubClosed> {
        self.leave_tx
            .send(LeaveRequest {
                room_id: room_id.to_owned(),
                connection_id,
            })
            .await
            .map_err(|_| HubClosed)
    }

    /// Queue `message` for every connection attached to `room_id`.
    pub async fn broadcast(
        &self,
        room_id: &str,
        message: impl Into<RoomMessage>,
    ) -> Result<(), HubClosed> {
        self.broadcast_tx
            .send(Broadcast {
                room_id: room_id.to_owned(),
                message: message.into(),
            })
            .await
            .map_err(|_| HubClosed)
    }

    /// Describe every live room, in no particular order.
    pub async fn rooms(&self) -> Result<Vec<RoomSnapshot>, HubClosed> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.snapshot_tx
            .send(reply_tx)
            .await
            .map_err(|_| HubClosed)?;
        reply_rx.await.map_err(|_| HubClosed)
    }
}

/// State owned by the dispatch loop.
pub struct Hub {
    rooms: HashMap<String, Room>,
    settings: HubSettings,
    coordinator: Arc<GameCoordinator>,
    broadcast_tx: mpsc::WeakSender<Broadcast>,
}

impl Hub {
    /// Start the dispatch loop on the current runtime.
    pub fn spawn(settings: HubSettings, coordinator: Arc<GameCoordinator>) -> HubHandle {
        let capacity = settings.queue_capacity;
        let (join_tx, join_rx) = mpsc::channel(capacity);
        let (leave_tx, leave_rx) = mpsc::channel(capacity);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(capacity);
        let (snapshot_tx, snapshot_rx) = mpsc::channel(16);

        let hub = Hub {
            rooms: HashMap::new(),
            settings,
            coordinator,
            broadcast_tx: broadcast_tx.downgrade(),
        };
        tokio::spawn(hub.run(join_rx, leave_rx, broadcast_rx, snapshot_rx));

        HubHandle {
            join_tx,
            leave_tx,
            broadcast_tx,
            snapshot_tx,
        }
    }

    async fn run(
        mut self,
        mut join_rx: mpsc::Receiver<Connection>,
        mut leave_rx: mpsc::Receiver<LeaveRequest>,
        mut broadcast_rx: mpsc::Receiver<Broadcast>,
        mut snapshot_rx: mpsc::Receiver<oneshot::Sender<Vec<RoomSnapshot>>>,
    ) {
        info!("room hub started");
        // Membership changes win over fan-out so a join or leave queued before
        // a broadcast is applied first.
        loop {
            tokio::select! {
                biased;
                Some(connection) = join_rx.recv() => self.join(connection),
                Some(request) = leave_rx.recv() => self.leave(request),
                Some(broadcast) = broadcast_rx.recv() => {
                    self.broadcast(&broadcast.room_id, &broadcast.message)
                }
                Some(reply) = snapshot_rx.recv() => {
                    let _ = reply.send(self.snapshot());
                }
                else => break,
            }
        }
        info!("room hub stopped");
    }

    fn join(&mut self, connection: Connection) {
        let room_id = connection.room_id.clone();
        let player_name = connection.player_name.clone();
        debug!(
            game_id = %room_id,
            connection_id = %connection.id,
            player_id = %connection.player_id,
            "connection joined room"
        );

        let room = self
            .rooms
            .entry(room_id.clone())
            .or_insert_with(|| Room::new(room_id.clone()));
        room.add(connection);
        let count = room.len();

        let event = events::player_joined(&room_id, &player_name, count);
        self.broadcast(&room_id, &event.into());
    }

    fn leave(&mut self, request: LeaveRequest) {
        let LeaveRequest {
            room_id,
            connection_id,
        } = request;
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return;
        };
        let Some(connection) = room.remove(&connection_id) else {
            return;
        };
        drop(connection);
        debug!(game_id = %room_id, %connection_id, "connection left room");

        if room.is_empty() {
            self.rooms.remove(&room_id);
            debug!(game_id = %room_id, "room emptied and removed");
        }
        self.schedule_status(room_id);
    }

    fn broadcast(&mut self, room_id: &str, message: &RoomMessage) {
        let Some(room) = self.rooms.get_mut(room_id) else {
            debug!(game_id = %room_id, "broadcast to unknown room dropped");
            return;
        };

        let payload = match serde_json::to_string(message) {
            Ok(json) => Utf8Bytes::from(json),
            Err(err) => {
                error!(game_id = %room_id, error = %err, "failed to serialize room message");
                return;
            }
        };

        let mut unresponsive = Vec::new();
        for connection in room.iter() {
            match connection.tx.try_send(payload.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        game_id = %room_id,
                        connection_id = %connection.id,
                        player_id = %connection.player_id,
                        "outbound queue full; dropping connection"
                    );
                    unresponsive.push(connection.id);
                }
                Err(TrySendError::Closed(_)) => unresponsive.push(connection.id),
            }
        }

        let dropped = !unresponsive.is_empty();
        for connection_id in unresponsive {
            room.remove(&connection_id);
        }
        if room.is_empty() {
            self.rooms.remove(room_id);
        }
        // Same roster refresh as a regular leave.
        if dropped {
            self.schedule_status(room_id.to_owned());
        }
    }

    fn snapshot(&self) -> Vec<RoomSnapshot> {
        self.rooms
            .values()
            .map(|room| RoomSnapshot {
                id: room.id.clone(),
                connections: room.len(),
                created_at: room.created_at,
            })
            .collect()
    }

    /// Refresh the room roster once the departure had time to reach the store.
    fn schedule_status(&self, room_id: String) {
        let Some(broadcast_tx) = self.broadcast_tx.upgrade() else {
            return;
        };
        let coordinator = self.coordinator.clone();
        let delay = self.settings.leave_status_debounce;

        tokio::spawn(async move {
            sleep(delay).await;
            match coordinator.status(&room_id).await {
                Ok(game) => {
                    let message = events::room_status(&room_id, &game, events::status_line(&game));
                    let _ = broadcast_tx
                        .send(Broadcast {
                            room_id,
                            message: message.into(),
                        })
                        .await;
                }
                Err(GameError::NotFound(_)) => {
                    debug!(game_id = %room_id, "no game left to report after departure");
                }
                Err(err) => {
                    warn!(game_id = %room_id, error = %err, "failed to load game for status refresh");
                }
            }
        });
    }
}
