//! Per-user conversation inventory.
//!
//! A `ThreadBook` tracks one summary per conversation the owner takes part
//! in: the merchant view keys by customer, the customer view keys by shop.
//! Summaries are created lazily the first time a peer shows up and are
//! mutated by broadcast frames; they are never destroyed while the book
//! lives.

use std::collections::HashMap;

use agora_shared::model::{Message, ThreadSummary, UserRole};

/// Which side of the conversations the owner sits on.
enum ViewSide {
    Customer { customer_id: String },
    Merchant { shop_id: String },
}

/// Conversation summaries for one user.
pub struct ThreadBook {
    owner_id: String,
    side: ViewSide,
    threads: HashMap<String, ThreadSummary>,
}

impl ThreadBook {
    /// Book for a merchant operating `shop_id`; threads key by customer.
    pub fn for_merchant(owner_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            side: ViewSide::Merchant {
                shop_id: shop_id.into(),
            },
            threads: HashMap::new(),
        }
    }

    /// Book for a customer; threads key by shop.
    pub fn for_customer(customer_id: impl Into<String>) -> Self {
        let customer_id = customer_id.into();
        Self {
            owner_id: customer_id.clone(),
            side: ViewSide::Customer { customer_id },
            threads: HashMap::new(),
        }
    }

    /// Seed from a `GET /api/chat/threads` response.
    pub fn load(&mut self, summaries: Vec<ThreadSummary>) {
        for summary in summaries {
            let peer = match &self.side {
                ViewSide::Merchant { .. } => summary.customer_id.clone(),
                ViewSide::Customer { .. } => summary.shop_id.clone(),
            };
            self.threads.insert(peer, summary);
        }
    }

    /// The peer id of a message, if it belongs to this book at all.
    fn peer_of(&self, message: &Message) -> Option<String> {
        match &self.side {
            ViewSide::Merchant { shop_id } if message.shop_id == *shop_id => {
                Some(message.customer_id.clone())
            }
            ViewSide::Customer { customer_id } if message.customer_id == *customer_id => {
                Some(message.shop_id.clone())
            }
            _ => None,
        }
    }

    /// Whether a message counts against the owner's unread counter.
    fn from_peer(&self, message: &Message) -> bool {
        match &self.side {
            ViewSide::Merchant { .. } => message.sender_type == UserRole::Customer,
            ViewSide::Customer { .. } => message.sender_type == UserRole::Merchant,
        }
    }

    /// Apply a broadcast message. Returns whether the book changed.
    pub fn absorb(&mut self, message: &Message) -> bool {
        let Some(peer) = self.peer_of(message) else {
            return false;
        };
        let unread = self.from_peer(message);
        let entry = self.threads.entry(peer).or_insert_with(|| ThreadSummary {
            customer_id: message.customer_id.clone(),
            shop_id: message.shop_id.clone(),
            last_message: None,
            unread_count: 0,
            last_activity: 0,
        });
        entry.last_message = Some(message.clone());
        entry.last_activity = entry.last_activity.max(message.created_at);
        if unread {
            entry.unread_count += 1;
        }
        true
    }

    /// Apply a thread-level read broadcast.
    ///
    /// When the owner did the reading, the unread counter resets. When the
    /// peer did, the owner's outgoing messages show as seen instead.
    pub fn apply_read(&mut self, customer_id: &str, shop_id: &str, reader_id: &str) {
        let peer = match &self.side {
            ViewSide::Merchant { shop_id: own } if shop_id == own => customer_id.to_string(),
            ViewSide::Customer { customer_id: own } if customer_id == own => shop_id.to_string(),
            _ => return,
        };
        let owner_read = reader_id == self.owner_id;
        if let Some(entry) = self.threads.get_mut(&peer) {
            if owner_read {
                entry.unread_count = 0;
            } else if let Some(last) = &mut entry.last_message {
                if last.sender_id == self.owner_id {
                    last.read = true;
                }
            }
        }
    }

    /// Summaries ordered by most recent activity.
    pub fn threads(&self) -> Vec<&ThreadSummary> {
        let mut list: Vec<&ThreadSummary> = self.threads.values().collect();
        list.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
        list
    }

    pub fn unread_total(&self) -> u32 {
        self.threads.values().map(|t| t.unread_count).sum()
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}
