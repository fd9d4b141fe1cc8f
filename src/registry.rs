//! Room registry
//!
//! Owns every room for the lifetime of the process. Populated at startup;
//! lookups take a read lock and creation takes the write lock, so concurrent
//! readers never observe a half-inserted room.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::error::AppError;
use crate::room::{Room, RoomSummary};
use crate::types::RoomId;

#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomId, Arc<Room>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the room for `name`, or return it if it already exists
    pub async fn create(&self, name: &str) -> Arc<Room> {
        let id = RoomId::from_name(name);
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(id)
            .or_insert_with(|| {
                let room = Room::new(name);
                info!("Room '{}' created as '{}'", room.name, room.id);
                Arc::new(room)
            })
            .clone()
    }

    /// Look up a room by id
    pub async fn get(&self, id: &RoomId) -> Result<Arc<Room>, AppError> {
        let rooms = self.rooms.read().await;
        rooms
            .get(id)
            .cloned()
            .ok_or_else(|| AppError::RoomNotFound(id.to_string()))
    }

    /// All rooms, ordered by id
    pub async fn list(&self) -> Vec<Arc<Room>> {
        let rooms = self.rooms.read().await;
        let mut list: Vec<Arc<Room>> = rooms.values().cloned().collect();
        list.sort_by(|a, b| a.id.cmp(&b.id));
        list
    }

    /// Snapshots of all rooms, ordered by id
    ///
    /// Room locks are taken one at a time, never while holding another.
    pub async fn summaries(&self) -> Vec<RoomSummary> {
        let mut summaries = Vec::new();
        for room in self.list().await {
            summaries.push(room.summary().await);
        }
        summaries
    }

    pub async fn len(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rooms.read().await.is_empty()
    }
}
