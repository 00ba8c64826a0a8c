//! Live chat session: the per-conversation subscription adapter.
//!
//! A `LiveChat` subscribes to the connection manager, filters broadcast
//! frames down to its own conversation, and exposes the intent functions UI
//! code calls (`join`, `leave`, `send`, `mark_read`). Local state only ever changes
//! through the staged-send pipeline and the broadcast channel, so every
//! client, including the sender's other sessions, converges on the same
//! message list.

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use agora_shared::frame::{ClientFrame, ServerFrame};
use agora_shared::model::{Identity, Message, PostMessageBody};
use agora_shared::time::now_millis;

use crate::api::ApiClient;
use crate::error::ClientError;
use crate::socket::{ConnectionManager, Subscription};

use super::{SendError, SessionKey, ThreadState};

/// Events a live chat session emits toward its UI.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// A send was staged locally; render it (and scroll to bottom).
    MessageStaged(Message),
    /// The staged entry was replaced by the server-confirmed copy.
    MessageConfirmed { temp_id: String, message: Message },
    /// A broadcast message joined the thread.
    MessageArrived(Message),
    /// A send failed; the draft must go back into the input field.
    SendFailed { temp_id: String, draft: String },
    /// The thread's read state changed.
    ThreadMarkedRead { reader_id: String },
    /// A single message's read state changed.
    MessageRead { message_id: String },
    /// The transport reported a problem (informational; reconnects are
    /// automatic).
    ConnectionError(String),
}

/// One open conversation.
pub struct LiveChat {
    manager: Arc<ConnectionManager>,
    api: ApiClient,
    key: SessionKey,
    identity: Identity,
    thread: Arc<Mutex<ThreadState>>,
    events_tx: mpsc::UnboundedSender<ChatEvent>,
    pump: Option<JoinHandle<()>>,
}

impl LiveChat {
    /// Open a conversation: subscribe, announce presence, fetch history,
    /// and start pumping broadcast frames. The returned receiver yields
    /// [`ChatEvent`]s for the UI.
    pub async fn open(
        manager: Arc<ConnectionManager>,
        api: ApiClient,
        identity: Identity,
        key: SessionKey,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>), ClientError> {
        let subscription = manager.subscribe();
        let thread = Arc::new(Mutex::new(ThreadState::new()));
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let pump = tokio::spawn(pump_frames(
            subscription,
            key.clone(),
            thread.clone(),
            events_tx.clone(),
        ));

        let live = Self {
            manager,
            api,
            key,
            identity,
            thread,
            events_tx,
            pump: Some(pump),
        };
        live.join();

        // Seed from history after the pump is running; a broadcast racing
        // the fetch dedupes by id when both copies land.
        let history = live
            .api
            .fetch_messages(
                &live.key.customer_id,
                &live.key.shop_id,
                live.key.product_id.as_deref(),
            )
            .await?;
        {
            let mut state = live.thread.lock().unwrap();
            for message in history {
                state.absorb(message);
            }
        }

        Ok((live, events_rx))
    }

    /// Announce presence for this conversation. Advisory: the server
    /// attributes messages by key whether or not a join was seen, so a
    /// failed transmit is logged and ignored.
    pub fn join(&self) -> bool {
        let frame = ClientFrame::JoinChat {
            customer_id: self.key.customer_id.clone(),
            shop_id: self.key.shop_id.clone(),
            product_id: self.key.product_id.clone(),
        };
        let sent = self.manager.send(&frame);
        if !sent {
            tracing::debug!("join_chat not delivered (transport not open)");
        }
        sent
    }

    /// Mirror of [`Self::join`]; skipped silently if the transport already
    /// dropped.
    pub fn leave(&self) -> bool {
        let frame = ClientFrame::LeaveChat {
            customer_id: self.key.customer_id.clone(),
            shop_id: self.key.shop_id.clone(),
        };
        let sent = self.manager.send(&frame);
        if !sent {
            tracing::debug!("leave_chat skipped (transport not open)");
        }
        sent
    }

    /// Snapshot of the rendered message list.
    pub fn messages(&self) -> Vec<Message> {
        self.thread.lock().unwrap().messages().to_vec()
    }

    /// Send a message through the optimistic pipeline: stage locally, POST,
    /// then reconcile. On failure the staged entry is rolled back and the
    /// draft comes back to the caller.
    pub async fn send(&self, text: &str) -> Result<Message, SendError> {
        let client_key = Uuid::new_v4().to_string();
        let staged = self.thread.lock().unwrap().stage(
            &self.key,
            &self.identity.user_id,
            self.identity.role,
            text,
            now_millis(),
            client_key.clone(),
        );
        let _ = self.events_tx.send(ChatEvent::MessageStaged(staged.clone()));

        let body = PostMessageBody {
            customer_id: self.key.customer_id.clone(),
            shop_id: self.key.shop_id.clone(),
            product_id: self.key.product_id.clone(),
            sender_id: self.identity.user_id.clone(),
            sender_type: self.identity.role,
            message: text.to_string(),
            client_key: Some(client_key),
        };

        match self.api.post_message(&body).await {
            Ok(confirmed) => {
                self.thread
                    .lock()
                    .unwrap()
                    .confirm(&staged.id, confirmed.clone());
                let _ = self.events_tx.send(ChatEvent::MessageConfirmed {
                    temp_id: staged.id,
                    message: confirmed.clone(),
                });
                Ok(confirmed)
            }
            Err(source) => {
                let draft = self
                    .thread
                    .lock()
                    .unwrap()
                    .fail(&staged.id)
                    .unwrap_or_else(|| text.to_string());
                let _ = self.events_tx.send(ChatEvent::SendFailed {
                    temp_id: staged.id,
                    draft: draft.clone(),
                });
                Err(SendError { draft, source })
            }
        }
    }

    /// Report that a message was viewed. Best-effort: the read-state
    /// broadcast is the source of truth.
    pub fn mark_read(&self, message_id: &str) -> bool {
        let frame = ClientFrame::MessageRead {
            message_id: message_id.to_string(),
            customer_id: self.key.customer_id.clone(),
            shop_id: self.key.shop_id.clone(),
        };
        let sent = self.manager.send(&frame);
        if !sent {
            tracing::debug!("message_read not delivered (transport not open)");
        }
        sent
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    /// Close the session. `leave_chat` goes out only if the transport is
    /// still up; a dropped connection skips it silently.
    pub fn close(mut self) {
        self.leave();
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

impl Drop for LiveChat {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Pump broadcast frames into the thread state. Ends when the subscription
/// closes or the UI dropped its event receiver; a frame arriving after that
/// updates nothing.
async fn pump_frames(
    mut subscription: Subscription,
    key: SessionKey,
    thread: Arc<Mutex<ThreadState>>,
    events: mpsc::UnboundedSender<ChatEvent>,
) {
    while let Some(frame) = subscription.recv().await {
        let event = match frame {
            ServerFrame::MessageReceived { payload } if key.matches(&payload) => {
                let changed = thread.lock().unwrap().absorb(payload.clone());
                if !changed {
                    continue;
                }
                ChatEvent::MessageArrived(payload)
            }
            ServerFrame::MessagesMarkedRead {
                customer_id,
                shop_id,
                reader_id,
            } if customer_id == key.customer_id && shop_id == key.shop_id => {
                thread.lock().unwrap().mark_read_by(&reader_id);
                ChatEvent::ThreadMarkedRead { reader_id }
            }
            ServerFrame::MessageReadUpdated {
                message_id,
                customer_id,
                shop_id,
                ..
            } if customer_id == key.customer_id && shop_id == key.shop_id => {
                thread.lock().unwrap().apply_message_read(&message_id);
                ChatEvent::MessageRead { message_id }
            }
            ServerFrame::Error { message } => ChatEvent::ConnectionError(message),
            _ => continue,
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
