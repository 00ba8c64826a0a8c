//! Console session loops.
//!
//! A blocking rustyline thread feeds lines over a channel into the async
//! select loop, which interleaves them with chat events, order updates, and
//! connection status changes.

use std::sync::mpsc as std_mpsc;

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use uuid::Uuid;

use agora_shared::frame::ServerFrame;
use agora_shared::model::{
    Identity, MarkReadBody, OrderStatus, PostMessageBody, UpdateOrderStatusBody, UserRole,
};

use crate::api::{ApiClient, ws_endpoint};
use crate::chat::{ChatEvent, LiveChat, SessionKey, ThreadBook};
use crate::orders::{OrderFeed, RoleScope};
use crate::socket::{ConnectionManager, ManagerConfig};

use super::formatter::MessageFormatter;
use super::redisplay_prompt;

/// Spawn the blocking readline thread. Lines come back on the returned
/// receiver; a draft pushed into the returned sender preloads the next
/// prompt (used to restore failed sends).
fn spawn_readline(
    prompt: String,
) -> (
    mpsc::UnboundedReceiver<String>,
    std_mpsc::Sender<String>,
) {
    let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
    let (draft_tx, draft_rx) = std_mpsc::channel::<String>();

    std::thread::spawn(move || {
        let mut rl = match DefaultEditor::new() {
            Ok(rl) => rl,
            Err(e) => {
                eprintln!("Failed to initialize readline: {}", e);
                return;
            }
        };

        loop {
            let initial = draft_rx.try_recv().unwrap_or_default();
            match rl.readline_with_initial(&prompt, (&initial, "")) {
                Ok(line) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        rl.add_history_entry(line).ok();
                        if line_tx.send(line.to_string()).is_err() {
                            break;
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                    let _ = line_tx.send("/quit".to_string());
                    break;
                }
                Err(err) => {
                    tracing::error!("Readline error: {}", err);
                    break;
                }
            }
        }
    });

    (line_rx, draft_tx)
}

/// Watch the debounced flags and print status transitions.
fn spawn_status_watcher(
    manager: &ConnectionManager,
    prompt: String,
) -> tokio::task::JoinHandle<()> {
    let mut flags = manager.watch_flags();
    tokio::spawn(async move {
        loop {
            if flags.changed().await.is_err() {
                break;
            }
            let current = *flags.borrow();
            print!("{}", MessageFormatter::format_connection(current));
            redisplay_prompt(&prompt);
        }
    })
}

/// Parse an order status name as typed on the console.
fn parse_status(text: &str) -> Option<OrderStatus> {
    match text {
        "pending" => Some(OrderStatus::Pending),
        "in_progress" => Some(OrderStatus::InProgress),
        "ready_for_pickup" => Some(OrderStatus::ReadyForPickup),
        "completed" => Some(OrderStatus::Completed),
        "cancelled" => Some(OrderStatus::Cancelled),
        _ => None,
    }
}

/// Run the customer chat console against one shop.
pub async fn run_customer_console(
    server_url: String,
    customer_id: String,
    shop_id: String,
    product_id: Option<String>,
    token: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = ApiClient::new(&server_url).with_bearer(token);
    let config = ManagerConfig {
        endpoint: ws_endpoint(&server_url),
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::new(config);
    let identity = Identity::customer(customer_id.clone());
    manager.connect(identity.clone()).await?;

    let mut key = SessionKey::new(customer_id.clone(), shop_id.clone());
    if let Some(product_id) = product_id {
        key = key.with_product(product_id);
    }
    let (live, mut events) = LiveChat::open(manager.clone(), api, identity, key).await?;

    print!(
        "{}",
        MessageFormatter::format_history(&live.messages(), &customer_id)
    );
    println!(
        "\nYou are chatting with shop '{}'. Type a message and press Enter; \
         /reconnect to cycle the connection, /quit to exit.\n",
        shop_id
    );

    let prompt = format!("{}> ", customer_id);
    let status_task = spawn_status_watcher(&manager, prompt.clone());
    let (mut line_rx, draft_tx) = spawn_readline(prompt.clone());

    loop {
        tokio::select! {
            line = line_rx.recv() => match line.as_deref() {
                None | Some("/quit") => break,
                Some("/reconnect") => {
                    manager.force_reconnect().await;
                    // Re-announce presence once the fresh link is up.
                    live.join();
                    redisplay_prompt(&prompt);
                }
                Some(text) => {
                    if let Err(e) = live.send(text).await {
                        print!("{}", MessageFormatter::format_send_failed(&e.draft));
                        // Put the draft back into the input field.
                        let _ = draft_tx.send(e.draft);
                        redisplay_prompt(&prompt);
                    }
                }
            },
            event = events.recv() => match event {
                None => break,
                Some(event) => {
                    match event {
                        ChatEvent::MessageStaged(message) => {
                            print!("{}", MessageFormatter::format_chat_message(&message, &customer_id));
                        }
                        ChatEvent::MessageConfirmed { message, .. } => {
                            print!("{}", MessageFormatter::format_chat_message(&message, &customer_id));
                        }
                        ChatEvent::MessageArrived(message) => {
                            print!("{}", MessageFormatter::format_chat_message(&message, &customer_id));
                            // Viewing the conversation implies reading it.
                            live.mark_read(&message.id);
                        }
                        ChatEvent::ThreadMarkedRead { reader_id } => {
                            print!("\n(thread read by {})\n", reader_id);
                        }
                        ChatEvent::MessageRead { .. } => {}
                        ChatEvent::SendFailed { .. } => {
                            // Already reported on the send path.
                        }
                        ChatEvent::ConnectionError(message) => {
                            print!("\n(connection: {})\n", message);
                        }
                    }
                    redisplay_prompt(&prompt);
                }
            },
        }
    }

    live.close();
    manager.disconnect();
    status_task.abort();
    Ok(())
}

/// Run the merchant dashboard console for one shop.
pub async fn run_merchant_console(
    server_url: String,
    user_id: String,
    shop_id: String,
    token: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let api = ApiClient::new(&server_url).with_bearer(token);
    let config = ManagerConfig {
        endpoint: ws_endpoint(&server_url),
        ..ManagerConfig::default()
    };
    let manager = ConnectionManager::new(config);
    let identity = Identity::merchant(user_id.clone(), shop_id.clone());
    manager.connect(identity).await?;

    let mut book = ThreadBook::for_merchant(user_id.clone(), shop_id.clone());
    book.load(api.fetch_threads(&user_id, Some(&shop_id)).await?);
    print!("{}", MessageFormatter::format_thread_list(&book.threads()));
    println!(
        "\nWatching shop '{}'. Commands: /threads, /read <customer>, \
         /reply <customer> <text>, /advance <order> <status>, /quit\n",
        shop_id
    );

    let (_feed, mut orders_rx) = OrderFeed::attach(
        &manager,
        RoleScope::Merchant {
            shop_id: shop_id.clone(),
        },
    );
    let mut subscription = manager.subscribe();

    let prompt = format!("{}> ", shop_id);
    let status_task = spawn_status_watcher(&manager, prompt.clone());
    let (mut line_rx, _draft_tx) = spawn_readline(prompt.clone());

    loop {
        tokio::select! {
            line = line_rx.recv() => match line {
                None => break,
                Some(line) => {
                    if line == "/quit" {
                        break;
                    }
                    handle_merchant_command(&line, &api, &book, &user_id, &shop_id).await;
                    redisplay_prompt(&prompt);
                }
            },
            frame = subscription.recv() => match frame {
                None => break,
                Some(ServerFrame::MessageReceived { payload }) if payload.shop_id == shop_id => {
                    book.absorb(&payload);
                    print!("{}", MessageFormatter::format_chat_message(&payload, &user_id));
                    redisplay_prompt(&prompt);
                }
                Some(ServerFrame::MessagesMarkedRead { customer_id, shop_id: read_shop, reader_id })
                    if read_shop == shop_id =>
                {
                    book.apply_read(&customer_id, &read_shop, &reader_id);
                    print!("\n(thread with {} read by {})\n", customer_id, reader_id);
                    redisplay_prompt(&prompt);
                }
                Some(ServerFrame::Error { message }) => {
                    print!("\n(connection: {})\n", message);
                    redisplay_prompt(&prompt);
                }
                Some(_) => {}
            },
            update = orders_rx.recv() => match update {
                None => break,
                Some(update) => {
                    print!("{}", MessageFormatter::format_order_update(&update));
                    redisplay_prompt(&prompt);
                }
            },
        }
    }

    manager.disconnect();
    status_task.abort();
    Ok(())
}

async fn handle_merchant_command(
    line: &str,
    api: &ApiClient,
    book: &ThreadBook,
    user_id: &str,
    shop_id: &str,
) {
    let mut parts = line.splitn(3, ' ');
    match parts.next() {
        Some("/threads") => {
            print!("{}", MessageFormatter::format_thread_list(&book.threads()));
        }
        Some("/read") => {
            let Some(customer_id) = parts.next() else {
                println!("usage: /read <customer>");
                return;
            };
            let body = MarkReadBody {
                customer_id: customer_id.to_string(),
                shop_id: shop_id.to_string(),
                reader_id: user_id.to_string(),
            };
            if let Err(e) = api.mark_read(&body).await {
                println!("mark-read failed: {}", e);
            }
        }
        Some("/reply") => {
            let (Some(customer_id), Some(text)) = (parts.next(), parts.next()) else {
                println!("usage: /reply <customer> <text>");
                return;
            };
            let body = PostMessageBody {
                customer_id: customer_id.to_string(),
                shop_id: shop_id.to_string(),
                product_id: None,
                sender_id: user_id.to_string(),
                sender_type: UserRole::Merchant,
                message: text.to_string(),
                client_key: Some(Uuid::new_v4().to_string()),
            };
            // The broadcast echo updates the book; no local mutation here.
            if let Err(e) = api.post_message(&body).await {
                println!("reply failed: {}", e);
            }
        }
        Some("/advance") => {
            let (Some(order_id), Some(status_text)) = (parts.next(), parts.next()) else {
                println!("usage: /advance <order> <status>");
                return;
            };
            let Some(new_status) = parse_status(status_text) else {
                println!(
                    "unknown status '{}'; expected pending, in_progress, \
                     ready_for_pickup, completed, or cancelled",
                    status_text
                );
                return;
            };
            match api
                .update_order_status(order_id, &UpdateOrderStatusBody { new_status })
                .await
            {
                Ok(update) => print!("{}", MessageFormatter::format_order_update(&update)),
                Err(e) => println!("advance failed: {}", e),
            }
        }
        _ => {
            println!(
                "commands: /threads, /read <customer>, /reply <customer> <text>, \
                 /advance <order> <status>, /quit"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_known_names() {
        // given / when / then:
        assert_eq!(parse_status("pending"), Some(OrderStatus::Pending));
        assert_eq!(parse_status("in_progress"), Some(OrderStatus::InProgress));
        assert_eq!(
            parse_status("ready_for_pickup"),
            Some(OrderStatus::ReadyForPickup)
        );
        assert_eq!(parse_status("completed"), Some(OrderStatus::Completed));
        assert_eq!(parse_status("cancelled"), Some(OrderStatus::Cancelled));
    }

    #[test]
    fn test_parse_status_rejects_unknown_names() {
        // given / when / then:
        assert_eq!(parse_status("shipped"), None);
        assert_eq!(parse_status(""), None);
    }
}
