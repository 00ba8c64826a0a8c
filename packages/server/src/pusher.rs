//! Outbound frame delivery.
//!
//! The `FramePusher` trait abstracts how frames reach connected clients so
//! handlers can be tested against a mock. The WebSocket implementation
//! holds the per-connection sender channels created at upgrade time.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use agora_shared::frame::ServerFrame;

use crate::state::{ConnId, ConnSender};

/// Frame delivery errors.
#[derive(Debug, Error, PartialEq)]
pub enum PushError {
    #[error("connection {0} is not registered")]
    ConnectionNotFound(ConnId),
    #[error("connection {0} is closed")]
    ConnectionClosed(ConnId),
}

/// Delivery interface for server-to-client frames.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FramePusher: Send + Sync {
    /// Register a connection's sender channel.
    async fn register(&self, conn_id: ConnId, sender: ConnSender);

    /// Remove a connection's sender channel.
    async fn unregister(&self, conn_id: ConnId);

    /// Push a frame to one connection.
    async fn push_to(&self, conn_id: ConnId, frame: ServerFrame) -> Result<(), PushError>;

    /// Push a frame to every registered connection. Partial failures are
    /// tolerated: a client that dropped mid-broadcast is simply skipped.
    async fn broadcast_all(&self, frame: ServerFrame);

    /// Number of registered connections.
    async fn connection_count(&self) -> usize;
}

/// WebSocket-backed pusher.
pub struct WsFramePusher {
    senders: Mutex<HashMap<ConnId, ConnSender>>,
}

impl WsFramePusher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            senders: Mutex::new(HashMap::new()),
        })
    }
}

#[async_trait]
impl FramePusher for WsFramePusher {
    async fn register(&self, conn_id: ConnId, sender: ConnSender) {
        let mut senders = self.senders.lock().await;
        senders.insert(conn_id, sender);
        tracing::debug!("Connection {} registered with pusher", conn_id);
    }

    async fn unregister(&self, conn_id: ConnId) {
        let mut senders = self.senders.lock().await;
        senders.remove(&conn_id);
        tracing::debug!("Connection {} unregistered from pusher", conn_id);
    }

    async fn push_to(&self, conn_id: ConnId, frame: ServerFrame) -> Result<(), PushError> {
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize frame: {}", e);
                return Ok(());
            }
        };
        let senders = self.senders.lock().await;
        match senders.get(&conn_id) {
            Some(sender) => sender
                .send(json)
                .map_err(|_| PushError::ConnectionClosed(conn_id)),
            None => Err(PushError::ConnectionNotFound(conn_id)),
        }
    }

    async fn broadcast_all(&self, frame: ServerFrame) {
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Failed to serialize frame: {}", e);
                return;
            }
        };
        let senders = self.senders.lock().await;
        for (conn_id, sender) in senders.iter() {
            if sender.send(json.clone()).is_err() {
                tracing::warn!("Failed to push frame to connection {}", conn_id);
            }
        }
    }

    async fn connection_count(&self) -> usize {
        self.senders.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_push_to_registered_connection() {
        // given:
        let pusher = WsFramePusher::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        pusher.register(1, tx).await;

        // when:
        let result = pusher.push_to(1, ServerFrame::AuthOk).await;

        // then:
        assert!(result.is_ok());
        let received = rx.recv().await.unwrap();
        assert!(received.contains(r#""type":"auth_ok""#));
    }

    #[tokio::test]
    async fn test_push_to_unknown_connection() {
        // given:
        let pusher = WsFramePusher::new();

        // when:
        let result = pusher.push_to(42, ServerFrame::AuthOk).await;

        // then:
        assert_eq!(result, Err(PushError::ConnectionNotFound(42)));
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_connection() {
        // given:
        let pusher = WsFramePusher::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        pusher.register(1, tx1).await;
        pusher.register(2, tx2).await;

        // when:
        pusher
            .broadcast_all(ServerFrame::Error {
                message: "maintenance".to_string(),
            })
            .await;

        // then:
        assert!(rx1.recv().await.unwrap().contains("maintenance"));
        assert!(rx2.recv().await.unwrap().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_broadcast_tolerates_dropped_receiver() {
        // given: one live and one dropped connection
        let pusher = WsFramePusher::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, rx2) = mpsc::unbounded_channel();
        drop(rx2);
        pusher.register(1, tx1).await;
        pusher.register(2, tx2).await;

        // when:
        pusher.broadcast_all(ServerFrame::AuthOk).await;

        // then: the live connection still got the frame
        assert!(rx1.recv().await.unwrap().contains("auth_ok"));
    }

    #[tokio::test]
    async fn test_unregister_removes_connection() {
        // given:
        let pusher = WsFramePusher::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        pusher.register(1, tx).await;
        assert_eq!(pusher.connection_count().await, 1);

        // when:
        pusher.unregister(1).await;

        // then:
        assert_eq!(pusher.connection_count().await, 0);
        assert_eq!(
            pusher.push_to(1, ServerFrame::AuthOk).await,
            Err(PushError::ConnectionNotFound(1))
        );
    }
}
