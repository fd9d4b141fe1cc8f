//! Multi-room WebSocket Chat Relay Library
//!
//! Clients connect over WebSocket, join named rooms, and exchange text
//! messages that are broadcast to every member of the room.
//!
//! # Features
//! - Seeded room and user registries
//! - Room joining with join/leave announcements
//! - Best-effort fan-out with a per-write timeout
//! - Leave-on-disconnect for every joined room
//! - Room list over HTTP
//!
//! # Architecture
//! Shared state lives in an explicitly constructed `ChatState`:
//! - `RoomRegistry` maps room ids to rooms (read-mostly `RwLock`)
//! - Each `Room` guards its members and connections with its own lock
//! - Each connection runs a `Dispatcher` read loop plus a writer task
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use chat_relay::{server, ChatState, RelaySettings};
//!
//! #[tokio::main]
//! async fn main() {
//!     let state = ChatState::new(RelaySettings::default());
//!     state.rooms.create("Public").await;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:3001").await.unwrap();
//!     server::serve(listener, Arc::new(state), std::future::pending())
//!         .await
//!         .unwrap();
//! }
//! ```

pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod state;
pub mod types;
pub mod user;

// Re-export main types for convenience
pub use config::{Config, RelaySettings};
pub use connection::ConnectionHandle;
pub use dispatcher::{Dispatcher, Frame};
pub use error::{AppError, SendError};
pub use message::{ChatMessage, ClientCommand, ErrorCode, ServerMessage};
pub use registry::RoomRegistry;
pub use room::{BroadcastReport, Room, RoomSummary};
pub use state::ChatState;
pub use types::{ConnectionId, RoomId, UserId};
pub use user::{User, UserDirectory};
