use std::time::SystemTime;

use indexmap::IndexMap;

use super::connection::{Connection, ConnectionId};

/// Connections attached to one game identifier. Only the hub task touches it.
#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub created_at: SystemTime,
    connections: IndexMap<ConnectionId, Connection>,
}

impl Room {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            created_at: SystemTime::now(),
            connections: IndexMap::new(),
        }
    }

    pub fn add(&mut self, connection: Connection) {
        self.connections.insert(connection.id, connection);
    }

    /// Detach a connection, handing it back so the caller decides when its queue closes.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.connections.shift_remove(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
