//! Per-instance registry of live `Room` actors (`spec.md` §3
//! Ownership): whichever instance currently hosts a room's WebSocket
//! connections holds the only `Room` for it.
//!
//! Grounded on `crates/gateway/src/state.rs`'s connection-registry shape
//! (`RwLock<HashMap<...>>` of per-entity state), adapted to a
//! `Mutex<Room>` per entry since a room's state transitions (unlike a
//! connection registry's inserts/removes) need serialised access.

use crate::room::Room;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct RoomHub {
    rooms: Mutex<HashMap<String, Arc<Mutex<Room>>>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// The room for `match_id`, creating it (seeded with `started_at`)
    /// if this is the first instance to see it.
    pub async fn get_or_create(&self, match_id: &str, started_at: i64) -> Arc<Mutex<Room>> {
        let mut rooms = self.rooms.lock().await;
        rooms
            .entry(match_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Room::new(match_id, started_at))))
            .clone()
    }

    pub async fn get(&self, match_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.lock().await.get(match_id).cloned()
    }

    pub async fn remove(&self, match_id: &str) -> Option<Arc<Mutex<Room>>> {
        self.rooms.lock().await.remove(match_id)
    }
}
