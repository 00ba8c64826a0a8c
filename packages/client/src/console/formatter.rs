//! Message formatting utilities for console display.

use chrono::{DateTime, Utc};

use agora_shared::model::{Message, OrderUpdate, ThreadSummary};
use agora_shared::time::millis_to_rfc3339;

use crate::socket::ConnectionFlags;

/// Short `HH:MM` rendering for chat lines.
fn short_time(millis: i64) -> String {
    match DateTime::<Utc>::from_timestamp_millis(millis) {
        Some(dt) => dt.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// Message formatter for console display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format one chat message line. The viewer's own messages render as
    /// "you"; staged entries carry a sending marker until confirmed.
    pub fn format_chat_message(message: &Message, viewer_id: &str) -> String {
        let who = if message.sender_id == viewer_id {
            "you".to_string()
        } else {
            format!("@{}", message.sender_id)
        };
        let marker = if message.is_local() {
            " [sending...]"
        } else if message.read {
            " [seen]"
        } else {
            ""
        };
        format!(
            "\n[{}] {}: {}{}\n",
            short_time(message.created_at),
            who,
            message.body,
            marker
        )
    }

    /// Format a full history dump, oldest first.
    pub fn format_history(messages: &[Message], viewer_id: &str) -> String {
        if messages.is_empty() {
            return "\n(No messages yet)\n".to_string();
        }
        let mut output = String::new();
        output.push_str("\n------------------------------------------------------------\n");
        for message in messages {
            output.push_str(&Self::format_chat_message(message, viewer_id));
        }
        output.push_str("------------------------------------------------------------\n");
        output
    }

    /// Format the rollback notice after a failed send.
    pub fn format_send_failed(draft: &str) -> String {
        format!(
            "\n! Send failed. Your draft was restored:\n  {}\n",
            draft
        )
    }

    /// Format an order status change notification.
    pub fn format_order_update(update: &OrderUpdate) -> String {
        format!(
            "\n* Order {} ({} x{} from {}) moved {} -> {} at {}\n",
            update.order_id,
            update.snapshot.product_name,
            update.snapshot.quantity,
            update.snapshot.shop_name,
            update.previous_status.as_str(),
            update.new_status.as_str(),
            millis_to_rfc3339(update.updated_at)
        )
    }

    /// Format the merchant's thread list.
    pub fn format_thread_list(threads: &[&ThreadSummary]) -> String {
        if threads.is_empty() {
            return "\n(No conversations yet)\n".to_string();
        }
        let mut output = String::new();
        output.push_str("\nConversations:\n");
        for thread in threads {
            let last = thread
                .last_message
                .as_ref()
                .map(|m| m.body.as_str())
                .unwrap_or("(no messages)");
            output.push_str(&format!(
                "  {} - {} unread - last: {}\n",
                thread.customer_id, thread.unread_count, last
            ));
        }
        output
    }

    /// Format a connection status transition.
    pub fn format_connection(flags: ConnectionFlags) -> String {
        let label = if flags.is_connected {
            "[live]"
        } else if flags.is_connecting {
            "[connecting...]"
        } else {
            "[offline]"
        };
        format!("\n{}\n", label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_shared::model::UserRole;

    fn message(id: &str, sender_id: &str, body: &str) -> Message {
        Message {
            id: id.to_string(),
            client_key: None,
            customer_id: "c1".to_string(),
            shop_id: "s1".to_string(),
            product_id: None,
            sender_id: sender_id.to_string(),
            sender_type: UserRole::Customer,
            body: body.to_string(),
            read: false,
            created_at: 1672531200000,
        }
    }

    #[test]
    fn test_format_chat_message_marks_own_messages() {
        // given:
        let msg = message("m1", "c1", "Hello");

        // when:
        let own = MessageFormatter::format_chat_message(&msg, "c1");
        let other = MessageFormatter::format_chat_message(&msg, "m9");

        // then:
        assert!(own.contains("you: Hello"));
        assert!(other.contains("@c1: Hello"));
    }

    #[test]
    fn test_short_time_renders_hours_and_minutes() {
        // given: 2023-01-01 00:00 UTC
        let rendered = short_time(1672531200000);

        // then:
        assert_eq!(rendered, "00:00");

        // and an out-of-range timestamp degrades to a placeholder
        assert_eq!(short_time(i64::MAX), "--:--");
    }

    #[test]
    fn test_format_chat_message_marks_staged_entries() {
        // given:
        let mut msg = message("temp_1000", "c1", "Hello");
        msg.id = "temp_1000".to_string();

        // when:
        let formatted = MessageFormatter::format_chat_message(&msg, "c1");

        // then:
        assert!(formatted.contains("[sending...]"));
    }

    #[test]
    fn test_format_chat_message_marks_read_entries() {
        // given:
        let mut msg = message("m1", "c1", "Hello");
        msg.read = true;

        // when:
        let formatted = MessageFormatter::format_chat_message(&msg, "c1");

        // then:
        assert!(formatted.contains("[seen]"));
    }

    #[test]
    fn test_format_history_empty() {
        // given / when:
        let formatted = MessageFormatter::format_history(&[], "c1");

        // then:
        assert!(formatted.contains("(No messages yet)"));
    }

    #[test]
    fn test_format_send_failed_carries_draft() {
        // given / when:
        let formatted = MessageFormatter::format_send_failed("my unsent text");

        // then:
        assert!(formatted.contains("my unsent text"));
        assert!(formatted.contains("restored"));
    }

    #[test]
    fn test_format_connection_labels() {
        // given / when / then:
        assert!(
            MessageFormatter::format_connection(ConnectionFlags {
                is_connected: true,
                is_connecting: false
            })
            .contains("[live]")
        );
        assert!(
            MessageFormatter::format_connection(ConnectionFlags {
                is_connected: false,
                is_connecting: true
            })
            .contains("[connecting...]")
        );
        assert!(
            MessageFormatter::format_connection(ConnectionFlags::default()).contains("[offline]")
        );
    }
}
