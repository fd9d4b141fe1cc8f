//! Per-connection command dispatcher
//!
//! Reads inbound frames, decodes each into a `ClientCommand` and routes it to
//! the target room. The loop runs until the transport ends, a frame fails to
//! decode, or a room closes the connection after a failed write; teardown
//! then removes the connection from every room it joined.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tracing::{debug, info, warn};

use crate::connection::ConnectionHandle;
use crate::error::AppError;
use crate::message::{
    ChatMessage, ClientCommand, JoinRoomRequest, MessageRoomRequest, ServerMessage,
};
use crate::state::ChatState;
use crate::types::{RoomId, UserId};

/// Transport-neutral inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text frame carrying a JSON command
    Text(String),
    /// The peer asked to close
    Close,
    /// Ping, pong, non-UTF-8 binary: not part of the protocol
    Control,
}

/// Command dispatcher for one connection
pub struct Dispatcher {
    state: Arc<ChatState>,
    connection: Arc<ConnectionHandle>,
    /// Rooms joined through this connection and the user it joined as
    joined: HashMap<RoomId, UserId>,
    /// Users this connection has acted as, for online tracking
    identities: HashSet<UserId>,
}

impl Dispatcher {
    pub fn new(state: Arc<ChatState>, connection: Arc<ConnectionHandle>) -> Self {
        Self {
            state,
            connection,
            joined: HashMap::new(),
            identities: HashSet::new(),
        }
    }

    /// Run the read loop to completion, then tear the connection down
    pub async fn run<S, E>(mut self, mut frames: S)
    where
        S: Stream<Item = Result<Frame, E>> + Unpin,
        E: std::fmt::Display,
    {
        let connection = self.connection.clone();

        loop {
            let frame = tokio::select! {
                frame = frames.next() => frame,
                _ = connection.closed() => {
                    debug!("Connection {} closed by relay", connection.id);
                    break;
                }
            };

            match frame {
                Some(Ok(Frame::Text(text))) => {
                    if let Err(e) = self.handle_text(&text).await {
                        warn!("Dropping connection {}: {}", connection.id, e);
                        break;
                    }
                }
                Some(Ok(Frame::Close)) => {
                    debug!("Connection {} sent close frame", connection.id);
                    break;
                }
                Some(Ok(Frame::Control)) => {}
                Some(Err(e)) => {
                    warn!("Transport error on connection {}: {}", connection.id, e);
                    break;
                }
                None => break,
            }
        }

        self.terminate().await;
    }

    /// Handle one text frame
    ///
    /// Returns an error only when the connection must end. Command errors are
    /// reported to the client as an error frame.
    pub async fn handle_text(&mut self, text: &str) -> Result<(), AppError> {
        let command: ClientCommand = serde_json::from_str(text)?;

        match self.dispatch(command).await {
            Err(e) if !e.is_fatal() => {
                warn!("Command from connection {} failed: {}", self.connection.id, e);
                let reply: ServerMessage = e.into();
                if let Err(e) = self.connection.send(&reply).await {
                    debug!("Could not report error to {}: {}", self.connection.id, e);
                }
                Ok(())
            }
            result => result,
        }
    }

    /// Route a decoded command to its room
    pub async fn dispatch(&mut self, command: ClientCommand) -> Result<(), AppError> {
        match command {
            ClientCommand::JoinRoom(req) => self.join_room(req).await,
            ClientCommand::MessageRoom(req) => self.message_room(req).await,
        }
    }

    async fn join_room(&mut self, req: JoinRoomRequest) -> Result<(), AppError> {
        let room = self.state.rooms.get(&req.room_id).await?;
        let mut user = self.state.users.get(&req.joiner_id).await?;

        if self.identities.insert(user.id.clone()) {
            self.state.users.connect(&user.id).await;
        }
        user.online = true;

        room.join(self.connection.clone(), user).await;
        if let Some(previous) = self.joined.insert(room.id.clone(), req.joiner_id) {
            self.release_identity(previous).await;
        }
        Ok(())
    }

    /// Drop `user_id` from this connection once no joined room still uses it
    async fn release_identity(&mut self, user_id: UserId) {
        if self.joined.values().any(|joined| *joined == user_id) {
            return;
        }
        if self.identities.remove(&user_id) {
            debug!(
                "Connection {} no longer acts as '{}'",
                self.connection.id, user_id
            );
            self.state.users.disconnect(&user_id).await;
        }
    }

    async fn message_room(&mut self, req: MessageRoomRequest) -> Result<(), AppError> {
        if req.message.trim().is_empty() {
            return Err(AppError::EmptyMessage);
        }

        let room = self.state.rooms.get(&req.room_id).await?;
        if self.state.settings.require_membership && !room.contains_member(&req.member_id).await {
            return Err(AppError::NotInRoom(room.id.to_string()));
        }

        let message = ChatMessage::from_member(&req.member_id, &room.id, req.message);
        room.broadcast(message).await;
        Ok(())
    }

    /// Leave every joined room, close the transport and deregister
    pub async fn terminate(self) {
        let connection_id = self.connection.id;

        for (room_id, user_id) in &self.joined {
            match self.state.rooms.get(room_id).await {
                Ok(room) => {
                    if room.leave_connection(&connection_id).await.is_none() {
                        debug!("'{}' in '{}' already replaced or evicted", user_id, room_id);
                    }
                }
                Err(e) => warn!("Teardown of {}: {}", connection_id, e),
            }
        }
        for user_id in &self.identities {
            self.state.users.disconnect(user_id).await;
        }

        if self.connection.close() {
            debug!("Connection {} closed", connection_id);
        }
        self.state.deregister(&connection_id).await;

        info!(
            "Connection {} terminated after joining {} room(s)",
            connection_id,
            self.joined.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::convert::Infallible;

    use futures_util::stream;
    use tokio::sync::mpsc;

    use crate::config::RelaySettings;
    use crate::message::ErrorCode;
    use crate::user::User;

    async fn test_state() -> Arc<ChatState> {
        let state = ChatState::new(RelaySettings::default());
        state.rooms.create("Public").await;
        state.rooms.create("Private Channel").await;
        state.users.insert(User::new("u1", "Alice")).await;
        state.users.insert(User::new("u2", "Bob")).await;
        Arc::new(state)
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            messages.push(serde_json::from_str(&frame).unwrap());
        }
        messages
    }

    fn join(room_id: &str, user_id: &str) -> String {
        serde_json::json!({
            "action": "join-room",
            "data": {"room_id": room_id, "joiner_id": user_id}
        })
        .to_string()
    }

    fn say(room_id: &str, user_id: &str, text: &str) -> String {
        serde_json::json!({
            "action": "message-room",
            "data": {"room_id": room_id, "member_id": user_id, "message": text}
        })
        .to_string()
    }

    fn room_message(sender: &str, room: &str, text: &str) -> ServerMessage {
        ServerMessage::RoomMessage(ChatMessage {
            sender_id: sender.to_string(),
            room_id: room.to_string(),
            text: text.to_string(),
        })
    }

    #[tokio::test]
    async fn test_join_then_message() {
        let state = test_state().await;
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state.clone(), conn);

        dispatcher.handle_text(&join("public", "u1")).await.unwrap();
        dispatcher.handle_text(&say("public", "u1", "hi")).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![
                room_message("server", "public", "Alice has joined the chat"),
                room_message("u1", "public", "hi"),
            ]
        );
        assert!(state.users.get(&UserId::from("u1")).await.unwrap().online);
    }

    #[tokio::test]
    async fn test_unknown_room_reports_error_and_continues() {
        let state = test_state().await;
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state, conn.clone());

        dispatcher.handle_text(&say("nowhere", "u1", "hi")).await.unwrap();
        dispatcher.handle_text(&join("nowhere", "u1")).await.unwrap();

        let codes: Vec<ErrorCode> = drain(&mut rx)
            .into_iter()
            .map(|msg| match msg {
                ServerMessage::Error { code, .. } => code,
                other => panic!("Unexpected frame: {:?}", other),
            })
            .collect();
        assert_eq!(codes, vec![ErrorCode::RoomNotFound, ErrorCode::RoomNotFound]);
        assert!(!conn.is_closed());
    }

    #[tokio::test]
    async fn test_unknown_user_reports_error() {
        let state = test_state().await;
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state.clone(), conn);

        dispatcher.handle_text(&join("public", "ghost")).await.unwrap();

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code: ErrorCode::UserNotFound, .. }]
        ));
        let room = state.rooms.get(&RoomId::from("public")).await.unwrap();
        assert_eq!(room.member_count().await, 0);
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let state = test_state().await;
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state, conn);
        dispatcher.handle_text(&join("public", "u1")).await.unwrap();
        drain(&mut rx);

        dispatcher.handle_text(&say("public", "u1", "   ")).await.unwrap();

        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code: ErrorCode::EmptyMessage, .. }]
        ));
    }

    #[tokio::test]
    async fn test_malformed_frame_is_fatal() {
        let state = test_state().await;
        let (conn, _rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state, conn);

        let err = dispatcher.handle_text("not json").await.unwrap_err();
        assert!(err.is_fatal());

        let err = dispatcher
            .handle_text(r#"{"action": "shout", "data": {}}"#)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_membership_check_when_required() {
        let settings = RelaySettings {
            require_membership: true,
            ..RelaySettings::default()
        };
        let state = ChatState::new(settings);
        state.rooms.create("Public").await;
        state.users.insert(User::new("u1", "Alice")).await;
        let state = Arc::new(state);
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state, conn);

        dispatcher.handle_text(&say("public", "u1", "hi")).await.unwrap();
        assert!(matches!(
            drain(&mut rx).as_slice(),
            [ServerMessage::Error { code: ErrorCode::NotInRoom, .. }]
        ));

        dispatcher.handle_text(&join("public", "u1")).await.unwrap();
        dispatcher.handle_text(&say("public", "u1", "hi")).await.unwrap();
        assert_eq!(drain(&mut rx).last(), Some(&room_message("u1", "public", "hi")));
    }

    #[tokio::test]
    async fn test_switching_user_releases_previous_identity() {
        let state = test_state().await;
        let (conn, mut rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state.clone(), conn);

        dispatcher.handle_text(&join("public", "u1")).await.unwrap();
        dispatcher.handle_text(&join("public", "u2")).await.unwrap();

        assert!(!state.users.get(&UserId::from("u1")).await.unwrap().online);
        assert!(state.users.get(&UserId::from("u2")).await.unwrap().online);
        assert_eq!(
            drain(&mut rx),
            vec![
                room_message("server", "public", "Alice has joined the chat"),
                room_message("server", "public", "Alice has left the chat"),
                room_message("server", "public", "Bob has joined the chat"),
            ]
        );
    }

    #[tokio::test]
    async fn test_switching_user_keeps_identity_used_elsewhere() {
        let state = test_state().await;
        let (conn, _rx) = state.open_connection().await;
        let mut dispatcher = Dispatcher::new(state.clone(), conn);

        dispatcher.handle_text(&join("public", "u1")).await.unwrap();
        dispatcher.handle_text(&join("private_channel", "u1")).await.unwrap();
        dispatcher.handle_text(&join("public", "u2")).await.unwrap();

        // Still joined as Alice in the private channel
        assert!(state.users.get(&UserId::from("u1")).await.unwrap().online);

        dispatcher.terminate().await;
        assert!(!state.users.get(&UserId::from("u1")).await.unwrap().online);
        assert!(!state.users.get(&UserId::from("u2")).await.unwrap().online);
    }

    #[tokio::test]
    async fn test_run_leaves_every_joined_room_on_exit() {
        let state = test_state().await;
        let (watcher, mut watcher_rx) = state.open_connection().await;
        let mut watcher_dispatcher = Dispatcher::new(state.clone(), watcher);
        watcher_dispatcher.handle_text(&join("public", "u2")).await.unwrap();
        watcher_dispatcher.handle_text(&join("private_channel", "u2")).await.unwrap();

        let (conn, _rx) = state.open_connection().await;
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Frame::Text(join("public", "u1"))),
            Ok(Frame::Text(join("private_channel", "u1"))),
            Ok(Frame::Control),
            Ok(Frame::Close),
            Ok(Frame::Text(say("public", "u1", "never sent"))),
        ]);
        drain(&mut watcher_rx);
        Dispatcher::new(state.clone(), conn.clone()).run(frames).await;

        assert!(conn.is_closed());
        assert_eq!(state.connection_count().await, 1);
        assert!(!state.users.get(&UserId::from("u1")).await.unwrap().online);
        for room_id in ["public", "private_channel"] {
            let room = state.rooms.get(&RoomId::from(room_id)).await.unwrap();
            assert_eq!(room.member_count().await, 1);
            assert_eq!(room.connection_count().await, 1);
        }

        let texts: Vec<String> = drain(&mut watcher_rx)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::RoomMessage(m) => Some(m.text),
                _ => None,
            })
            .collect();
        assert_eq!(
            texts,
            vec![
                "Alice has joined the chat",
                "Alice has joined the chat",
                "Alice has left the chat",
                "Alice has left the chat",
            ]
        );
    }

    #[tokio::test]
    async fn test_run_exits_on_decode_failure() {
        let state = test_state().await;
        let (conn, _rx) = state.open_connection().await;
        let frames = stream::iter(vec![
            Ok::<_, Infallible>(Frame::Text(join("public", "u1"))),
            Ok(Frame::Text("{broken".to_string())),
        ]);

        Dispatcher::new(state.clone(), conn.clone()).run(frames).await;

        assert!(conn.is_closed());
        let room = state.rooms.get(&RoomId::from("public")).await.unwrap();
        assert_eq!(room.member_count().await, 0);
        assert_eq!(state.connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_exits_when_relay_closes_connection() {
        let state = test_state().await;
        let (conn, _rx) = state.open_connection().await;
        conn.close();

        // A stream that never yields: only the close signal can end the loop
        Dispatcher::new(state.clone(), conn)
            .run(stream::pending::<Result<Frame, Infallible>>())
            .await;

        assert_eq!(state.connection_count().await, 0);
    }
}
