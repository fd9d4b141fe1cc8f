//! Connection handle definition
//!
//! Represents one client's WebSocket session as seen by rooms: a bounded
//! outbound queue drained by the socket writer task, and a close signal
//! shared with the read loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::ConnectionId;

/// Handle to a live client connection
///
/// Rooms hold `Arc<ConnectionHandle>`; the transport itself is owned by the
/// connection's writer task, which receives serialized frames from the queue.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Relay → Client frame queue
    sender: mpsc::Sender<String>,
    /// Flips to `true` exactly once, when the connection is closed
    closed: watch::Sender<bool>,
    /// Upper bound on how long a single write may wait for queue space
    write_timeout: Duration,
}

impl ConnectionHandle {
    /// Create a new handle with a queue of `buffer` frames
    ///
    /// Returns the handle and the receiving end of its outbound queue.
    pub fn new(write_timeout: Duration, buffer: usize) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let (closed, _) = watch::channel(false);
        let handle = Self {
            id: ConnectionId::new(),
            sender,
            closed,
            write_timeout,
        };
        (Arc::new(handle), receiver)
    }

    /// Queue an already serialized frame
    ///
    /// Waits at most `write_timeout` for queue space. Fails immediately if the
    /// connection is closed or the writer side has gone away.
    pub async fn send_frame(&self, frame: String) -> Result<(), SendError> {
        if self.is_closed() {
            return Err(SendError::Closed);
        }
        self.sender
            .send_timeout(frame, self.write_timeout)
            .await
            .map_err(|e| match e {
                mpsc::error::SendTimeoutError::Timeout(_) => SendError::Timeout,
                mpsc::error::SendTimeoutError::Closed(_) => SendError::Closed,
            })
    }

    /// Serialize and queue a message for this client only
    pub async fn send(&self, msg: &ServerMessage) -> Result<(), SendError> {
        let frame = serde_json::to_string(msg).map_err(|e| SendError::Encode(e.to_string()))?;
        self.send_frame(frame).await
    }

    /// Close the connection
    ///
    /// Idempotent: returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Check whether `close` has been called
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolve once the connection has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::message::ChatMessage;
    use crate::types::RoomId;

    #[tokio::test]
    async fn test_send_queues_frame() {
        let (conn, mut rx) = ConnectionHandle::new(Duration::from_millis(50), 4);
        let msg = ServerMessage::RoomMessage(ChatMessage::system(&RoomId::from("public"), "hi"));

        conn.send(&msg).await.unwrap();

        let frame = rx.recv().await.unwrap();
        let decoded: ServerMessage = serde_json::from_str(&frame).unwrap();
        assert_eq!(decoded, msg);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (conn, _rx) = ConnectionHandle::new(Duration::from_millis(50), 4);

        assert!(!conn.is_closed());
        assert!(conn.close());
        assert!(!conn.close());
        assert!(conn.is_closed());

        // Already closed: resolves immediately
        conn.closed().await;
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (conn, _rx) = ConnectionHandle::new(Duration::from_millis(50), 4);
        conn.close();

        let result = conn.send_frame("{}".to_string()).await;
        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_fails() {
        let (conn, rx) = ConnectionHandle::new(Duration::from_millis(50), 4);
        drop(rx);

        let result = conn.send_frame("{}".to_string()).await;
        assert_eq!(result, Err(SendError::Closed));
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out() {
        let (conn, _rx) = ConnectionHandle::new(Duration::from_millis(20), 1);

        conn.send_frame("first".to_string()).await.unwrap();
        let result = conn.send_frame("second".to_string()).await;
        assert_eq!(result, Err(SendError::Timeout));
    }

    #[tokio::test]
    async fn test_closed_wakes_waiter() {
        let (conn, _rx) = ConnectionHandle::new(Duration::from_millis(50), 4);
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };

        conn.close();
        waiter.await.unwrap();
    }
}
