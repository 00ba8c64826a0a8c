//! Marketplace entities carried by the real-time frames and the REST API.

use serde::{Deserialize, Serialize};

/// Role a user acts under. Doubles as the sender type on messages,
/// where only `Customer` and `Merchant` occur.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Customer,
    Merchant,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Customer => "customer",
            UserRole::Merchant => "merchant",
            UserRole::Admin => "admin",
        }
    }
}

/// Who a real-time connection speaks for.
///
/// Merchants carry the id of the shop they operate; customers and admins
/// leave `shop_id` empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub role: UserRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop_id: Option<String>,
}

impl Identity {
    pub fn customer(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Customer,
            shop_id: None,
        }
    }

    pub fn merchant(user_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Merchant,
            shop_id: Some(shop_id.into()),
        }
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            role: UserRole::Admin,
            shop_id: None,
        }
    }
}

/// One chat message between a customer and a shop.
///
/// `id` is server-assigned. While a send is in flight the client stages a
/// local copy under a `temp_<epoch-ms>` id; `client_key` is the idempotency
/// key generated at that moment and echoed back by the server, so the staged
/// copy can be reconciled no matter whether the HTTP response or the
/// broadcast echo arrives first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
    pub customer_id: String,
    pub shop_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub sender_id: String,
    pub sender_type: UserRole,
    pub body: String,
    #[serde(default)]
    pub read: bool,
    /// Creation time, epoch milliseconds.
    pub created_at: i64,
}

impl Message {
    /// Whether this is a locally staged entry that has not been confirmed.
    pub fn is_local(&self) -> bool {
        self.id.starts_with("temp_")
    }
}

/// Lifecycle of an order or reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    InProgress,
    ReadyForPickup,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::ReadyForPickup => "ready_for_pickup",
            OrderStatus::Completed => "completed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

/// Denormalized order context shipped with each status broadcast, so
/// dashboards can render without a follow-up fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSnapshot {
    pub product_name: String,
    pub shop_name: String,
    pub quantity: u32,
    /// Unit price in minor currency units.
    pub unit_price: i64,
}

/// Broadcast payload for an order status change.
///
/// Ephemeral: consumed once by each interested dashboard, never retained by
/// the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderUpdate {
    pub order_id: String,
    pub customer_id: String,
    pub shop_id: String,
    pub previous_status: OrderStatus,
    pub new_status: OrderStatus,
    pub snapshot: OrderSnapshot,
    /// Update time, epoch milliseconds.
    pub updated_at: i64,
}

/// Summary of one conversation, as served by `GET /api/chat/threads`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub customer_id: String,
    pub shop_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<Message>,
    pub unread_count: u32,
    /// Last activity, epoch milliseconds.
    pub last_activity: i64,
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMessageBody {
    pub customer_id: String,
    pub shop_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    pub sender_id: String,
    pub sender_type: UserRole,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_key: Option<String>,
}

/// Body of `PATCH /api/messages/mark-read`: marks every message in the
/// `(customer_id, shop_id)` thread not sent by `reader_id` as read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkReadBody {
    pub customer_id: String,
    pub shop_id: String,
    pub reader_id: String,
}

/// Body of `PATCH /api/orders/{order_id}/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOrderStatusBody {
    pub new_status: OrderStatus,
}
