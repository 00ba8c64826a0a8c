//! Wire frames for the real-time channel.
//!
//! Every frame is a JSON object tagged by a `type` field. The server pushes
//! each broadcast frame to all connected clients; filtering down to the
//! frames a given consumer cares about happens client-side.

use serde::{Deserialize, Serialize};

use crate::model::{Message, OrderUpdate, UserRole};

/// Frames sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Sent once per connection, immediately after the transport opens.
    Auth {
        user_id: String,
        user_type: UserRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        shop_id: Option<String>,
    },
    /// Advisory presence signal for a conversation. Not required for
    /// correctness; the server attributes messages by key regardless.
    JoinChat {
        customer_id: String,
        shop_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        product_id: Option<String>,
    },
    /// Mirrors `JoinChat`; sent on session teardown while still connected.
    LeaveChat {
        customer_id: String,
        shop_id: String,
    },
    /// A specific message was viewed by the reader.
    MessageRead {
        message_id: String,
        customer_id: String,
        shop_id: String,
    },
}

/// Frames sent by the server (or synthesized locally by the connection
/// manager for transport-level failures).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// The auth frame was accepted.
    AuthOk,
    /// The auth frame was rejected; the server closes right after.
    AuthFailed { reason: String },
    /// Broadcast on any new message.
    MessageReceived { payload: Message },
    /// Broadcast after a single message was viewed.
    MessageReadUpdated {
        message_id: String,
        customer_id: String,
        shop_id: String,
        reader_id: String,
    },
    /// Broadcast after a whole thread was marked read.
    MessagesMarkedRead {
        customer_id: String,
        shop_id: String,
        reader_id: String,
    },
    /// Broadcast on any order status change.
    OrderStatusUpdated { payload: OrderUpdate },
    /// Non-fatal error report.
    Error { message: String },
}

impl ServerFrame {
    /// Parse a raw text frame. `None` means the payload was malformed and
    /// must be dropped without reaching subscribers.
    pub fn parse(text: &str) -> Option<Self> {
        match serde_json::from_str(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::warn!("Dropping malformed frame: {}", e);
                None
            }
        }
    }
}

impl ClientFrame {
    /// Serialize for transmission.
    pub fn to_json(&self) -> String {
        // Serialization of these enums cannot fail: no non-string keys, no
        // fallible Serialize impls.
        serde_json::to_string(self).unwrap_or_default()
    }
}
