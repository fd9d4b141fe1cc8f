//! Basic type definitions for the chat relay
//!
//! Provides newtype wrappers for type safety:
//! - `ConnectionId`: UUID-based identifier for one WebSocket session
//! - `RoomId`: room identifier derived from the room's display name
//! - `UserId`: stable user identifier supplied by clients

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4. A fresh id is issued for every accepted socket, so the
/// same user reconnecting gets a different `ConnectionId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier
///
/// Derived from a room name by lowercasing it and replacing spaces with
/// underscores, so `"Private Channel"` becomes `"private_channel"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub String);

impl RoomId {
    /// Derive the id for a room name
    pub fn from_name(name: &str) -> Self {
        Self(name.to_lowercase().replace(' ', "_"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable user identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_id_from_name() {
        assert_eq!(RoomId::from_name("Public").as_str(), "public");
        assert_eq!(
            RoomId::from_name("Private Channel").as_str(),
            "private_channel"
        );
    }

    #[test]
    fn test_room_id_derivation_is_idempotent() {
        let first = RoomId::from_name("Private Channel");
        let again = RoomId::from_name("Private Channel");
        assert_eq!(first, again);

        // Deriving from an already-derived id is a no-op
        assert_eq!(RoomId::from_name(first.as_str()), first);
    }

    #[test]
    fn test_room_id_keeps_multiple_spaces() {
        assert_eq!(RoomId::from_name("Late  Night").as_str(), "late__night");
    }
}
