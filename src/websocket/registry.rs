//! Room Registry
//!
//! Maps room ids to live rooms. Rooms are created on first join and
//! dropped once they retire. The registry lock is held only for the map
//! lookup/insert/delete and never while waiting on a room lock; a room's
//! `retired` flag is the only room state it reads.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::connection::Connection;
use super::room::{Room, RoomId, RoomRetired};

/// Registry of active rooms
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
    send_timeout: Duration,
}

impl RoomRegistry {
    /// Create an empty registry. `send_timeout` bounds each member write
    /// in rooms created by this registry.
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Return the live room for `id`, creating it if absent or retired
    pub async fn get_or_create(&self, id: &str) -> Arc<Room> {
        if let Some(room) = self.rooms.read().await.get(id) {
            if !room.is_retired() {
                return Arc::clone(room);
            }
        }

        let mut rooms = self.rooms.write().await;
        match rooms.get(id) {
            Some(room) if !room.is_retired() => Arc::clone(room),
            _ => {
                let room = Arc::new(Room::new(id, self.send_timeout));
                rooms.insert(id.to_string(), Arc::clone(&room));
                tracing::debug!(room_id = %id, "Room created");
                room
            }
        }
    }

    /// Add `conn` to the room for `id` and return that room.
    ///
    /// If the room retires between lookup and join, the stale entry is
    /// dropped and the join retried against a fresh room.
    pub async fn join(&self, id: &str, conn: &Arc<dyn Connection>) -> Arc<Room> {
        loop {
            let room = self.get_or_create(id).await;
            match room.join(conn).await {
                Ok(_) => return room,
                Err(RoomRetired(_)) => {
                    self.remove_if_empty(&room).await;
                }
            }
        }
    }

    /// Drop `room` from the registry if it is still the registered room
    /// for its id and has retired. Returns true if it was removed.
    pub async fn remove_if_empty(&self, room: &Arc<Room>) -> bool {
        let mut rooms = self.rooms.write().await;
        let is_current = rooms
            .get(room.id())
            .map(|current| Arc::ptr_eq(current, room))
            .unwrap_or(false);

        if is_current && room.is_retired() {
            rooms.remove(room.id());
            tracing::debug!(room_id = %room.id(), "Room removed");
            true
        } else {
            false
        }
    }

    /// Currently registered room for `id`, if any
    pub async fn room(&self, id: &str) -> Option<Arc<Room>> {
        self.rooms.read().await.get(id).cloned()
    }

    /// Number of registered rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    /// Total members across all rooms
    pub async fn member_count(&self) -> usize {
        // Snapshot first so no room lock is taken under the registry lock.
        let rooms: Vec<Arc<Room>> = self.rooms.read().await.values().cloned().collect();

        let mut total = 0;
        for room in rooms {
            total += room.member_count().await;
        }
        total
    }
}
