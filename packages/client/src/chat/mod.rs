//! Chat sessions: conversation identity, the optimistic thread state, the
//! per-user thread book, and the live subscription adapter.

mod live;
mod thread;
mod threads;

use thiserror::Error;

use agora_shared::model::Message;

use crate::error::ClientError;

pub use live::{ChatEvent, LiveChat};
pub use thread::ThreadState;
pub use threads::ThreadBook;

/// Conversation identity.
///
/// Two keys address the same conversation iff `customer_id` and `shop_id`
/// match. `product_id` narrows the context of individual messages but does
/// not split threads; it still rides on join frames and history fetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub customer_id: String,
    pub shop_id: String,
    pub product_id: Option<String>,
}

impl SessionKey {
    pub fn new(customer_id: impl Into<String>, shop_id: impl Into<String>) -> Self {
        Self {
            customer_id: customer_id.into(),
            shop_id: shop_id.into(),
            product_id: None,
        }
    }

    pub fn with_product(mut self, product_id: impl Into<String>) -> Self {
        self.product_id = Some(product_id.into());
        self
    }

    /// Whether a message belongs to this conversation.
    pub fn matches(&self, message: &Message) -> bool {
        self.customer_id == message.customer_id && self.shop_id == message.shop_id
    }
}

/// A failed send. Carries the original draft so the caller can restore it
/// into the input field; typed content is never lost on failure.
#[derive(Debug, Error)]
#[error("failed to send message: {source}")]
pub struct SendError {
    pub draft: String,
    #[source]
    pub source: ClientError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::model::UserRole;

    fn message(customer_id: &str, shop_id: &str, product_id: Option<&str>) -> Message {
        Message {
            id: "m1".to_string(),
            client_key: None,
            customer_id: customer_id.to_string(),
            shop_id: shop_id.to_string(),
            product_id: product_id.map(str::to_string),
            sender_id: customer_id.to_string(),
            sender_type: UserRole::Customer,
            body: "hi".to_string(),
            read: false,
            created_at: 1,
        }
    }

    #[test]
    fn test_session_key_matches_on_customer_and_shop() {
        // given:
        let key = SessionKey::new("c1", "s1");

        // when / then:
        assert!(key.matches(&message("c1", "s1", None)));
        assert!(!key.matches(&message("c2", "s1", None)));
        assert!(!key.matches(&message("c1", "s2", None)));
    }

    #[test]
    fn test_session_key_ignores_product_for_matching() {
        // given: a key scoped to a product
        let key = SessionKey::new("c1", "s1").with_product("p1");

        // when / then: messages about other products still belong here
        assert!(key.matches(&message("c1", "s1", Some("p2"))));
        assert!(key.matches(&message("c1", "s1", None)));
    }
}
