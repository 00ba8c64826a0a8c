//! Optimistic thread state.
//!
//! One `ThreadState` holds the ordered message list of a single
//! conversation plus the bookkeeping for sends that have not been confirmed
//! yet. The confirmation path (HTTP response) and the broadcast echo race
//! freely; reconciliation converges to exactly one entry per logical
//! message no matter which arrives first.

use std::collections::HashMap;

use agora_shared::model::{Message, UserRole};

use super::SessionKey;

/// Bookkeeping for one unconfirmed send.
struct PendingSend {
    client_key: String,
    draft: String,
}

/// Ordered message list with optimistic-send reconciliation.
///
/// Invariants:
/// - no message id appears twice
/// - messages are in non-decreasing `created_at` order (sort-on-insert)
/// - for each unconfirmed send exactly one staged `temp_*` entry exists,
///   replaced or removed once the server answers, never both kept
#[derive(Default)]
pub struct ThreadState {
    messages: Vec<Message>,
    pending: HashMap<String, PendingSend>,
}

impl ThreadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Stage a locally visible entry for a send about to go out. Returns
    /// the staged message (temp id, current timestamp, sender = self).
    pub fn stage(
        &mut self,
        key: &SessionKey,
        sender_id: &str,
        sender_type: UserRole,
        text: &str,
        now: i64,
        client_key: String,
    ) -> Message {
        let mut id = format!("temp_{}", now);
        // Two sends in the same millisecond must not collide.
        let mut n = 1;
        while self.contains_id(&id) {
            id = format!("temp_{}_{}", now, n);
            n += 1;
        }

        let staged = Message {
            id: id.clone(),
            client_key: Some(client_key.clone()),
            customer_id: key.customer_id.clone(),
            shop_id: key.shop_id.clone(),
            product_id: key.product_id.clone(),
            sender_id: sender_id.to_string(),
            sender_type,
            body: text.to_string(),
            read: false,
            created_at: now,
        };
        self.pending.insert(
            id,
            PendingSend {
                client_key,
                draft: text.to_string(),
            },
        );
        self.insert_sorted(staged.clone());
        staged
    }

    /// Reconcile a staged entry against the server-confirmed copy. If the
    /// broadcast echo already landed, the temp entry is gone and the
    /// confirmed copy is recognized as present; nothing is duplicated.
    /// Returns whether the visible list changed.
    pub fn confirm(&mut self, temp_id: &str, confirmed: Message) -> bool {
        self.pending.remove(temp_id);
        let removed_temp = self.remove_by_id(temp_id);
        if self.contains_id(&confirmed.id) {
            return removed_temp;
        }
        self.insert_sorted(confirmed);
        true
    }

    /// Roll a failed send back: the staged entry disappears and the typed
    /// text comes back byte-for-byte for the input field.
    pub fn fail(&mut self, temp_id: &str) -> Option<String> {
        let pending = self.pending.remove(temp_id)?;
        self.remove_by_id(temp_id);
        Some(pending.draft)
    }

    /// Apply a broadcast (or history) message. Dedupes by server id, then
    /// reconciles against a staged copy by client key. Returns whether the
    /// visible list changed.
    pub fn absorb(&mut self, incoming: Message) -> bool {
        if self.contains_id(&incoming.id) {
            return false;
        }

        if let Some(incoming_key) = &incoming.client_key {
            let staged_id = self
                .pending
                .iter()
                .find(|(_, pending)| pending.client_key == *incoming_key)
                .map(|(id, _)| id.clone());
            if let Some(staged_id) = staged_id {
                // The echo beat the HTTP response; the later confirm becomes
                // a no-op.
                self.pending.remove(&staged_id);
                self.remove_by_id(&staged_id);
            }
        }

        self.insert_sorted(incoming);
        true
    }

    /// Mark every message not sent by `reader_id` as read.
    pub fn mark_read_by(&mut self, reader_id: &str) {
        for message in &mut self.messages {
            if message.sender_id != reader_id {
                message.read = true;
            }
        }
    }

    /// Mark a single message read.
    pub fn apply_message_read(&mut self, message_id: &str) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == message_id) {
            message.read = true;
        }
    }

    fn contains_id(&self, id: &str) -> bool {
        self.messages.iter().any(|m| m.id == id)
    }

    fn remove_by_id(&mut self, id: &str) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    fn insert_sorted(&mut self, message: Message) {
        let idx = self
            .messages
            .partition_point(|m| m.created_at <= message.created_at);
        self.messages.insert(idx, message);
    }
}
