//! Shared relay state
//!
//! Everything connections share, constructed once at startup and handed to
//! the router and every dispatcher as `Arc<ChatState>`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::config::{Config, RelaySettings};
use crate::connection::ConnectionHandle;
use crate::registry::RoomRegistry;
use crate::types::ConnectionId;
use crate::user::{User, UserDirectory};

#[derive(Debug, Default)]
pub struct ChatState {
    pub rooms: RoomRegistry,
    pub users: UserDirectory,
    /// Every live connection, joined to a room or not
    connections: RwLock<HashMap<ConnectionId, Arc<ConnectionHandle>>>,
    pub settings: RelaySettings,
}

impl ChatState {
    /// Create empty state
    pub fn new(settings: RelaySettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Create state seeded with the configured rooms and users
    pub async fn from_config(config: &Config) -> Self {
        let state = Self::new(config.settings());
        for name in &config.rooms {
            state.rooms.create(name).await;
        }
        for seed in &config.users {
            state.users.insert(User::from(seed.clone())).await;
        }
        state
    }

    /// Open and register a new connection
    ///
    /// Returns the handle and the outbound queue its writer must drain.
    pub async fn open_connection(&self) -> (Arc<ConnectionHandle>, mpsc::Receiver<String>) {
        let (handle, outbound) =
            ConnectionHandle::new(self.settings.write_timeout, self.settings.outbound_buffer);
        let mut connections = self.connections.write().await;
        connections.insert(handle.id, handle.clone());
        debug!("Connection {} registered, total {}", handle.id, connections.len());
        (handle, outbound)
    }

    /// Remove a connection from the global set
    pub async fn deregister(&self, id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let mut connections = self.connections.write().await;
        let removed = connections.remove(id);
        debug!("Connection {} deregistered, total {}", id, connections.len());
        removed
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::types::{RoomId, UserId};
    use clap::Parser;

    #[tokio::test]
    async fn test_from_config_seeds_rooms_and_users() {
        let config = Config::parse_from(["chat_relay"]);
        let state = ChatState::from_config(&config).await;

        assert!(state.rooms.get(&RoomId::from("public")).await.is_ok());
        assert!(state.rooms.get(&RoomId::from("private_channel")).await.is_ok());
        let user = state.users.get(&UserId::from("JohnCena")).await.unwrap();
        assert_eq!(user.display_name, "Johnathan Cena");
    }

    #[tokio::test]
    async fn test_connection_set() {
        let state = ChatState::new(RelaySettings::default());

        let (conn, _rx) = state.open_connection().await;
        assert_eq!(state.connection_count().await, 1);

        assert!(state.deregister(&conn.id).await.is_some());
        assert!(state.deregister(&conn.id).await.is_none());
        assert_eq!(state.connection_count().await, 0);
    }
}
