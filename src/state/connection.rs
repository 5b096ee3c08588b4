use axum::extract::ws::Utf8Bytes;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::game::PlayerId;

/// Unique identifier of one attached socket.
pub type ConnectionId = Uuid;

/// Handle registered in a room for one attached socket.
///
/// The hub owns the only copy of `tx`; dropping the handle closes the
/// connection's outbound queue.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub room_id: String,
    pub player_id: PlayerId,
    pub player_name: String,
    pub tx: mpsc::Sender<Utf8Bytes>,
}

impl Connection {
    pub fn new(
        room_id: impl Into<String>,
        player_id: impl Into<PlayerId>,
        player_name: impl Into<String>,
        tx: mpsc::Sender<Utf8Bytes>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id: room_id.into(),
            player_id: player_id.into(),
            player_name: player_name.into(),
            tx,
        }
    }
}

/// Lifecycle of a connection. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConnectionPhase {
    Connected,
    /// Identity was verified by the upgrade handshake.
    Authenticated,
    /// Registered in the hub and exchanging frames.
    Active,
    Closed,
}

impl ConnectionPhase {
    /// Move to `next` if it lies ahead; returns whether the phase changed.
    pub fn advance(&mut self, next: ConnectionPhase) -> bool {
        if next > *self {
            *self = next;
            true
        } else {
            false
        }
    }
}
