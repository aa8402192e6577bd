//! Room Store
//!
//! Owns the map from room code to live room. Rooms are created lazily on
//! first reference and persist for the lifetime of the process - there is
//! no idle eviction in this core.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::game::room::{Room, SharedRoom};

/// Concurrency-safe map from room code to room.
///
/// Only insertion/lookup safety is needed: a code is claimed at most once,
/// because collisions are retried under the write lock before the room
/// becomes observable.
pub struct RoomStore {
    rooms: RwLock<HashMap<String, SharedRoom>>,
}

impl RoomStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Allocate a fresh room under a unique 4-digit code.
    ///
    /// Codes are drawn uniformly from [1000, 9999] and regenerated on
    /// collision with any existing code.
    pub async fn create_room(&self) -> (String, SharedRoom) {
        let mut rooms = self.rooms.write().await;
        let code = loop {
            let candidate = rand::thread_rng().gen_range(1000u32..=9999).to_string();
            if !rooms.contains_key(&candidate) {
                break candidate;
            }
        };
        let handle: SharedRoom = Arc::new(Mutex::new(Room::new(code.clone())));
        rooms.insert(code.clone(), handle.clone());
        debug!("[room {}] created", code);
        (code, handle)
    }

    /// Look up a room by code.
    pub async fn get(&self, code: &str) -> Option<SharedRoom> {
        self.rooms.read().await.get(code).cloned()
    }

    /// Number of live rooms.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_room_allocates_valid_code() {
        let store = RoomStore::new();
        let (code, handle) = store.create_room().await;

        let numeric: u32 = code.parse().unwrap();
        assert!((1000..=9999).contains(&numeric));
        assert_eq!(store.room_count().await, 1);
        assert_eq!(handle.lock().await.code, code);
    }

    #[tokio::test]
    async fn test_codes_are_unique() {
        let store = RoomStore::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..50 {
            let (code, _) = store.create_room().await;
            assert!(seen.insert(code));
        }
        assert_eq!(store.room_count().await, 50);
    }

    #[tokio::test]
    async fn test_get_returns_same_room() {
        let store = RoomStore::new();
        let (code, handle) = store.create_room().await;

        let fetched = store.get(&code).await.unwrap();
        assert!(Arc::ptr_eq(&handle, &fetched));
        assert!(store.get("0000").await.is_none());
    }
}
