//! Session Registry
//!
//! Maps each live connection to a lightweight participant record: identity,
//! display name, and the room currently occupied. Records are created on
//! connect and destroyed on disconnect; identity is an ephemeral monotonic
//! counter, never persisted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;

use crate::game::state::PlayerId;

/// Connection-scoped participant record.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Display name.
    pub name: String,
    /// Code of the room this participant currently occupies, if any.
    pub room: Option<String>,
}

/// Registry of live connections.
pub struct SessionRegistry {
    next_id: AtomicU64,
    connections: RwLock<HashMap<PlayerId, Connection>>,
}

impl SessionRegistry {
    /// Create an empty registry. Ids start at 1.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection and allocate its participant id.
    pub async fn register(&self, name: impl Into<String>) -> PlayerId {
        let id = PlayerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.connections.write().await.insert(
            id,
            Connection {
                name: name.into(),
                room: None,
            },
        );
        id
    }

    /// Remove a connection's record, returning it if it existed.
    pub async fn unregister(&self, id: PlayerId) -> Option<Connection> {
        self.connections.write().await.remove(&id)
    }

    /// Record which room a participant occupies.
    pub async fn set_room(&self, id: PlayerId, room: Option<String>) {
        if let Some(conn) = self.connections.write().await.get_mut(&id) {
            conn.room = room;
        }
    }

    /// The room a participant currently occupies.
    pub async fn room_of(&self, id: PlayerId) -> Option<String> {
        self.connections.read().await.get(&id).and_then(|c| c.room.clone())
    }

    /// A participant's display name.
    pub async fn name_of(&self, id: PlayerId) -> Option<String> {
        self.connections.read().await.get(&id).map(|c| c.name.clone())
    }

    /// Number of live connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ids_are_unique_and_increasing() {
        let registry = SessionRegistry::new();
        let a = registry.register("Player").await;
        let b = registry.register("Player").await;
        assert!(b.0 > a.0);
        assert_eq!(registry.connection_count().await, 2);
    }

    #[tokio::test]
    async fn test_register_unregister() {
        let registry = SessionRegistry::new();
        let id = registry.register("Player").await;
        assert_eq!(registry.name_of(id).await.as_deref(), Some("Player"));

        let record = registry.unregister(id).await.unwrap();
        assert_eq!(record.name, "Player");
        assert_eq!(registry.connection_count().await, 0);
        assert!(registry.name_of(id).await.is_none());
    }

    #[tokio::test]
    async fn test_room_assignment() {
        let registry = SessionRegistry::new();
        let id = registry.register("Player").await;
        assert!(registry.room_of(id).await.is_none());

        registry.set_room(id, Some("4242".to_string())).await;
        assert_eq!(registry.room_of(id).await.as_deref(), Some("4242"));

        registry.set_room(id, None).await;
        assert!(registry.room_of(id).await.is_none());
    }
}
