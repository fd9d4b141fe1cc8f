//! Room definition
//!
//! A named chat room owning its member set and the connections those members
//! joined through. Join, leave, and broadcast all run under the room's own
//! lock, so operations on one room serialize while different rooms proceed
//! independently.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionHandle;
use crate::message::{ChatMessage, ServerMessage};
use crate::types::{ConnectionId, RoomId, UserId};
use crate::user::User;

/// A member and the connection it joined through
#[derive(Debug)]
struct Member {
    user: User,
    connection: ConnectionId,
}

/// Members and connections of a room
///
/// Kept as a bijection: every connection maps to exactly one member and
/// every member to exactly one connection.
#[derive(Debug, Default)]
struct RoomState {
    members: HashMap<UserId, Member>,
    connections: HashMap<ConnectionId, (UserId, Arc<ConnectionHandle>)>,
}

impl RoomState {
    /// Add a member, displacing stale pairings on either side
    ///
    /// Returns the user this connection previously joined as, when that
    /// user differs from the one being admitted.
    fn admit(&mut self, connection: Arc<ConnectionHandle>, user: User) -> Option<User> {
        // The user re-joined through a different connection
        if let Some(previous) = self.members.remove(&user.id) {
            self.connections.remove(&previous.connection);
        }
        // The connection previously joined as another user
        let displaced = self
            .connections
            .remove(&connection.id)
            .and_then(|(previous_user, _)| self.members.remove(&previous_user))
            .map(|member| member.user);

        let connection_id = connection.id;
        self.connections
            .insert(connection_id, (user.id.clone(), connection));
        self.members.insert(
            user.id.clone(),
            Member {
                user,
                connection: connection_id,
            },
        );
        displaced
    }

    fn remove_member(&mut self, user_id: &UserId) -> Option<(User, Arc<ConnectionHandle>)> {
        let member = self.members.remove(user_id)?;
        let (_, handle) = self.connections.remove(&member.connection)?;
        Some((member.user, handle))
    }

    fn remove_connection(
        &mut self,
        connection_id: &ConnectionId,
    ) -> Option<(User, Arc<ConnectionHandle>)> {
        let (user_id, handle) = self.connections.remove(connection_id)?;
        let member = self.members.remove(&user_id)?;
        Some((member.user, handle))
    }
}

/// Outcome of a broadcast
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections that received the broadcast message
    pub delivered: usize,
    /// Connections dropped because a write failed or timed out
    pub evicted: Vec<ConnectionId>,
}

/// Serializable view of a room for the room list endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub members: BTreeMap<UserId, User>,
}

/// Multi-member chat room
#[derive(Debug)]
pub struct Room {
    /// Id derived from the name
    pub id: RoomId,
    /// Display name
    pub name: String,
    state: Mutex<RoomState>,
}

impl Room {
    /// Create an empty room, deriving its id from `name`
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: RoomId::from_name(&name),
            name,
            state: Mutex::new(RoomState::default()),
        }
    }

    /// Add `user` to the room through `connection` and announce it
    ///
    /// Re-joining replaces the member's connection instead of adding a
    /// second membership record. A connection that joins as a different user
    /// gives up its previous member, which is announced as a departure first.
    ///
    /// Returns the broadcast report of the join notice and the displaced user.
    pub async fn join(
        &self,
        connection: Arc<ConnectionHandle>,
        user: User,
    ) -> (BroadcastReport, Option<User>) {
        let mut state = self.state.lock().await;
        info!(
            "User '{}' joined room '{}' via connection {}",
            user.id, self.id, connection.id
        );

        let notice = ChatMessage::system(
            &self.id,
            format!("{} has joined the chat", user.display_name),
        );
        let displaced = state.admit(connection, user);
        if let Some(previous) = &displaced {
            self.announce_departure(&mut state, previous).await;
        }
        let report = self.fan_out(&mut state, notice).await;
        (report, displaced)
    }

    /// Remove `user_id` from the room and announce it
    ///
    /// Returns the removed user, or `None` if it was not a member.
    pub async fn leave(&self, user_id: &UserId) -> Option<User> {
        let mut state = self.state.lock().await;
        let (user, _) = state.remove_member(user_id)?;
        self.announce_departure(&mut state, &user).await;
        Some(user)
    }

    /// Remove whichever member joined through `connection_id`
    ///
    /// Used on connection teardown. A member that has since re-joined through
    /// another connection is left in place.
    pub async fn leave_connection(&self, connection_id: &ConnectionId) -> Option<User> {
        let mut state = self.state.lock().await;
        let (user, _) = state.remove_connection(connection_id)?;
        self.announce_departure(&mut state, &user).await;
        Some(user)
    }

    /// Deliver `message` to every connection in the room
    pub async fn broadcast(&self, message: ChatMessage) -> BroadcastReport {
        let mut state = self.state.lock().await;
        self.fan_out(&mut state, message).await
    }

    /// Check whether a user is currently a member
    pub async fn contains_member(&self, user_id: &UserId) -> bool {
        self.state.lock().await.members.contains_key(user_id)
    }

    pub async fn member_count(&self) -> usize {
        self.state.lock().await.members.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    /// Snapshot of the room for listing
    pub async fn summary(&self) -> RoomSummary {
        let state = self.state.lock().await;
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            members: state
                .members
                .iter()
                .map(|(id, member)| (id.clone(), member.user.clone()))
                .collect(),
        }
    }

    async fn announce_departure(&self, state: &mut RoomState, user: &User) {
        info!("User '{}' left room '{}'", user.id, self.id);
        let notice = ChatMessage::system(
            &self.id,
            format!("{} has left the chat", user.display_name),
        );
        self.fan_out(state, notice).await;
    }

    /// Write `message` to every connection, evicting the ones that fail
    ///
    /// Each eviction queues a departure notice for the remaining members.
    /// Terminates because every extra round follows at least one eviction.
    async fn fan_out(&self, state: &mut RoomState, message: ChatMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let mut pending = VecDeque::from([message]);
        let mut first = true;

        while let Some(message) = pending.pop_front() {
            let frame = match serde_json::to_string(&ServerMessage::RoomMessage(message)) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("Failed to serialize message for room '{}': {}", self.id, e);
                    continue;
                }
            };

            let mut failed = Vec::new();
            for (connection_id, (_, handle)) in state.connections.iter() {
                match handle.send_frame(frame.clone()).await {
                    Ok(()) => {
                        if first {
                            report.delivered += 1;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Dropping connection {} from room '{}': {}",
                            connection_id, self.id, e
                        );
                        failed.push(*connection_id);
                    }
                }
            }
            first = false;

            for connection_id in failed {
                if let Some((user, handle)) = state.remove_connection(&connection_id) {
                    handle.close();
                    report.evicted.push(connection_id);
                    pending.push_back(ChatMessage::system(
                        &self.id,
                        format!("{} has left the chat", user.display_name),
                    ));
                }
            }
        }

        debug!(
            "Room '{}' broadcast delivered to {} connection(s), evicted {}",
            self.id,
            report.delivered,
            report.evicted.len()
        );
        report
    }
}
