//! In-memory marketplace store: messages and orders.
//!
//! Backs the REST endpoints and the broadcast handlers. Timestamps come
//! from an injected clock so thread summaries and order updates are
//! deterministic under test.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use agora_shared::model::{
    Message, OrderSnapshot, OrderStatus, OrderUpdate, PostMessageBody, ThreadSummary, UserRole,
};
use agora_shared::time::Clock;

/// Store-level errors.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("order '{0}' not found")]
    OrderNotFound(String),
    #[error("message '{0}' not found")]
    MessageNotFound(String),
}

/// One stored order.
#[derive(Debug, Clone)]
pub struct OrderRecord {
    pub order_id: String,
    pub customer_id: String,
    pub shop_id: String,
    pub status: OrderStatus,
    pub snapshot: OrderSnapshot,
}

/// Messages and orders, in memory.
pub struct MarketStore {
    clock: Arc<dyn Clock>,
    messages: Vec<Message>,
    orders: HashMap<String, OrderRecord>,
}

impl MarketStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            messages: Vec::new(),
            orders: HashMap::new(),
        }
    }

    /// Register an order so its status can be advanced later.
    pub fn seed_order(&mut self, order: OrderRecord) {
        self.orders.insert(order.order_id.clone(), order);
    }

    /// Persist a message from a `POST /api/messages` body. The created
    /// entity carries a fresh server id and timestamp and echoes the
    /// caller's idempotency key.
    pub fn append_message(&mut self, body: PostMessageBody) -> Message {
        let message = Message {
            id: Uuid::new_v4().to_string(),
            client_key: body.client_key,
            customer_id: body.customer_id,
            shop_id: body.shop_id,
            product_id: body.product_id,
            sender_id: body.sender_id,
            sender_type: body.sender_type,
            body: body.message,
            read: false,
            created_at: self.clock.now_millis(),
        };
        self.messages.push(message.clone());
        message
    }

    /// Conversation history, ascending by creation time. A product id
    /// narrows the result; thread identity itself ignores it.
    pub fn messages_for(
        &self,
        customer_id: &str,
        shop_id: &str,
        product_id: Option<&str>,
    ) -> Vec<Message> {
        let mut result: Vec<Message> = self
            .messages
            .iter()
            .filter(|m| m.customer_id == customer_id && m.shop_id == shop_id)
            .filter(|m| product_id.is_none() || m.product_id.as_deref() == product_id)
            .cloned()
            .collect();
        result.sort_by_key(|m| m.created_at);
        result
    }

    /// Mark every message in a thread that the reader did not send as
    /// read. Returns how many messages changed.
    pub fn mark_thread_read(
        &mut self,
        customer_id: &str,
        shop_id: &str,
        reader_id: &str,
    ) -> usize {
        let mut updated = 0;
        for message in &mut self.messages {
            if message.customer_id == customer_id
                && message.shop_id == shop_id
                && message.sender_id != reader_id
                && !message.read
            {
                message.read = true;
                updated += 1;
            }
        }
        updated
    }

    /// Mark a single message read.
    pub fn mark_message_read(&mut self, message_id: &str) -> Result<Message, StoreError> {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(message) => {
                message.read = true;
                Ok(message.clone())
            }
            None => Err(StoreError::MessageNotFound(message_id.to_string())),
        }
    }

    /// Thread summaries for a customer, one per shop, most recent first.
    pub fn threads_for_customer(&self, customer_id: &str) -> Vec<ThreadSummary> {
        self.build_threads(
            |m| m.customer_id == customer_id,
            |m| m.shop_id.clone(),
            UserRole::Merchant,
        )
    }

    /// Thread summaries for a shop, one per customer, most recent first.
    pub fn threads_for_shop(&self, shop_id: &str) -> Vec<ThreadSummary> {
        self.build_threads(
            |m| m.shop_id == shop_id,
            |m| m.customer_id.clone(),
            UserRole::Customer,
        )
    }

    fn build_threads(
        &self,
        belongs: impl Fn(&Message) -> bool,
        peer_key: impl Fn(&Message) -> String,
        unread_sender: UserRole,
    ) -> Vec<ThreadSummary> {
        let mut threads: HashMap<String, ThreadSummary> = HashMap::new();
        for message in &self.messages {
            if !belongs(message) {
                continue;
            }
            let entry = threads
                .entry(peer_key(message))
                .or_insert_with(|| ThreadSummary {
                    customer_id: message.customer_id.clone(),
                    shop_id: message.shop_id.clone(),
                    last_message: None,
                    unread_count: 0,
                    last_activity: 0,
                });
            if message.created_at >= entry.last_activity {
                entry.last_activity = message.created_at;
                entry.last_message = Some(message.clone());
            }
            if message.sender_type == unread_sender && !message.read {
                entry.unread_count += 1;
            }
        }
        let mut result: Vec<ThreadSummary> = threads.into_values().collect();
        result.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        result
    }

    /// Advance an order and produce the broadcast payload.
    pub fn update_order_status(
        &mut self,
        order_id: &str,
        new_status: OrderStatus,
    ) -> Result<OrderUpdate, StoreError> {
        let now = self.clock.now_millis();
        let order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| StoreError::OrderNotFound(order_id.to_string()))?;
        let previous_status = order.status;
        order.status = new_status;
        Ok(OrderUpdate {
            order_id: order.order_id.clone(),
            customer_id: order.customer_id.clone(),
            shop_id: order.shop_id.clone(),
            previous_status,
            new_status,
            snapshot: order.snapshot.clone(),
            updated_at: now,
        })
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}
