//! Message protocol definitions
//!
//! JSON envelopes of the form `{"action": ..., "data": {...}}`. Both
//! directions use Serde's adjacently tagged enums, so an inbound frame is
//! decoded straight into its action-specific payload in a single pass.

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::types::{RoomId, UserId};

/// Sender id used for messages generated by the relay itself
pub const SYSTEM_SENDER: &str = "server";

/// Client → Server command envelope
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    /// Join a room as the given user
    JoinRoom(JoinRoomRequest),
    /// Broadcast a message to a room
    MessageRoom(MessageRoomRequest),
}

/// Payload of `join-room`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct JoinRoomRequest {
    pub room_id: RoomId,
    pub joiner_id: UserId,
}

/// Payload of `message-room`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MessageRoomRequest {
    pub member_id: UserId,
    pub room_id: RoomId,
    pub message: String,
}

/// A chat line relayed to every member of a room
///
/// Never stored after broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    #[serde(rename = "member_id")]
    pub sender_id: String,
    pub room_id: String,
    #[serde(rename = "message")]
    pub text: String,
}

impl ChatMessage {
    /// Message authored by a member
    pub fn from_member(sender: &UserId, room: &RoomId, text: impl Into<String>) -> Self {
        Self {
            sender_id: sender.to_string(),
            room_id: room.to_string(),
            text: text.into(),
        }
    }

    /// Message authored by the relay (join/leave notices)
    pub fn system(room: &RoomId, text: impl Into<String>) -> Self {
        Self {
            sender_id: SYSTEM_SENDER.to_string(),
            room_id: room.to_string(),
            text: text.into(),
        }
    }
}

/// Server → Client envelope
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "action", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// A chat line (member or system) delivered to a room
    RoomMessage(ChatMessage),
    /// A command failed; sent only to the connection that issued it
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Unknown room id
    RoomNotFound,
    /// Unknown user id
    UserNotFound,
    /// Empty chat text
    EmptyMessage,
    /// Sender is not a member of the target room
    NotInRoom,
    /// Invalid message format
    InvalidMessage,
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let (code, message) = match &err {
            AppError::RoomNotFound(room_id) => {
                (ErrorCode::RoomNotFound, format!("Room '{}' not found", room_id))
            }
            AppError::UserNotFound(user_id) => {
                (ErrorCode::UserNotFound, format!("User '{}' not found", user_id))
            }
            AppError::EmptyMessage => {
                (ErrorCode::EmptyMessage, "Message must not be empty".to_string())
            }
            AppError::NotInRoom(room_id) => (
                ErrorCode::NotInRoom,
                format!("You have not joined room '{}'", room_id),
            ),
            AppError::Json(e) => {
                (ErrorCode::InvalidMessage, format!("Invalid message format: {}", e))
            }
            _ => (ErrorCode::InvalidMessage, "Internal error".to_string()),
        };
        ServerMessage::Error { code, message }
    }
}
