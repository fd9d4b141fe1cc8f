//! Error types for the chat relay
//!
//! Defines application-level errors and connection send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection termination) and
/// command errors (reported to the client, connection stays open).
#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed envelope or payload (fatal to the connection)
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// No room registered under the given id
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// No user registered under the given id
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// Chat text was empty or whitespace only
    #[error("Message is empty")]
    EmptyMessage,

    /// Sender has not joined the target room
    #[error("Not a member of room: {0}")]
    NotInRoom(String),

    /// `--user` seed could not be parsed
    #[error("Invalid user seed '{0}', expected ID:DISPLAY NAME")]
    InvalidUserSeed(String),
}

impl AppError {
    /// Whether this error ends the connection's read loop
    ///
    /// Decode and IO failures are fatal; lookup and validation failures only
    /// abort the current command.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::Json(_) | AppError::Io(_))
    }
}

/// Connection send errors
///
/// Occurs when an outbound frame cannot be queued for a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The connection has been closed
    #[error("Connection closed")]
    Closed,

    /// The client did not drain its queue within the write timeout
    #[error("Write timed out")]
    Timeout,

    /// The outbound message could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),
}
