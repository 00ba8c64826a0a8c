//! WebSocket connection handling.
//!
//! The first frame on a fresh connection must be `auth`; everything after
//! that is advisory presence, read receipts, or traffic pushed from the
//! broadcast side. Message and order mutations arrive over REST, never over
//! the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::stream::{SplitStream, StreamExt};
use futures_util::sink::SinkExt;
use tokio::sync::mpsc;

use agora_shared::frame::{ClientFrame, ServerFrame};
use agora_shared::model::Identity;
use agora_shared::time::now_millis;

use crate::registry::auth_rejection;
use crate::state::{AppState, ClientConn, ConnId};

/// How long a fresh connection may take to authenticate.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);
/// Policy-violation close code sent on auth rejection.
const CLOSE_POLICY: u16 = 1008;

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

pub async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let identity = match wait_for_auth(&mut receiver).await {
        Some(identity) => identity,
        None => {
            tracing::warn!("Connection dropped before authenticating");
            return;
        }
    };

    if let Some(reason) = auth_rejection(&identity) {
        tracing::warn!("Rejecting connection for '{}': {}", identity.user_id, reason);
        let frame = ServerFrame::AuthFailed {
            reason: reason.clone(),
        };
        if let Ok(json) = serde_json::to_string(&frame) {
            let _ = sender.send(WsMessage::Text(json.into())).await;
        }
        let _ = sender
            .send(WsMessage::Close(Some(CloseFrame {
                code: CLOSE_POLICY,
                reason: reason.into(),
            })))
            .await;
        return;
    }

    let conn_id = state.allocate_conn_id();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    {
        let mut registry = state.registry.lock().await;
        registry.insert(
            conn_id,
            ClientConn {
                identity: identity.clone(),
                connected_at: now_millis(),
            },
        );
    }
    state.pusher.register(conn_id, tx).await;

    if state.pusher.push_to(conn_id, ServerFrame::AuthOk).await.is_err() {
        tracing::warn!("Connection {} dropped before auth_ok", conn_id);
    }
    tracing::info!(
        "Connection {} authenticated as '{}' ({})",
        conn_id,
        identity.user_id,
        identity.role.as_str()
    );

    let recv_state = state.clone();
    let recv_identity = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            let message = match result {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!("WebSocket error on connection {}: {}", conn_id, e);
                    break;
                }
            };
            match message {
                WsMessage::Text(text) => {
                    handle_client_frame(&recv_state, conn_id, &recv_identity, &text).await;
                }
                WsMessage::Close(_) => {
                    tracing::info!("Connection {} requested close", conn_id);
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        while let Some(json) = rx.recv().await {
            if sender.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // If any one of the tasks completes, abort the other
    tokio::select! {
        _ = &mut recv_task => send_task.abort(),
        _ = &mut send_task => recv_task.abort(),
    };

    state.pusher.unregister(conn_id).await;
    {
        let mut registry = state.registry.lock().await;
        registry.remove(&conn_id);
    }
    tracing::info!("Connection {} closed", conn_id);
}

/// Read frames until the auth frame arrives. Anything else first, or
/// silence past the timeout, fails the handshake.
async fn wait_for_auth(receiver: &mut SplitStream<WebSocket>) -> Option<Identity> {
    let handshake = async {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                WsMessage::Text(text) => {
                    return match serde_json::from_str::<ClientFrame>(&text) {
                        Ok(ClientFrame::Auth {
                            user_id,
                            user_type,
                            shop_id,
                        }) => Some(Identity {
                            user_id,
                            role: user_type,
                            shop_id,
                        }),
                        Ok(other) => {
                            tracing::warn!("Expected auth frame, got {:?}", other);
                            None
                        }
                        Err(e) => {
                            tracing::warn!("Malformed frame before auth: {}", e);
                            None
                        }
                    };
                }
                WsMessage::Close(_) => return None,
                _ => {}
            }
        }
        None
    };
    tokio::time::timeout(AUTH_TIMEOUT, handshake)
        .await
        .unwrap_or(None)
}

/// Handle one post-auth client frame.
async fn handle_client_frame(
    state: &Arc<AppState>,
    conn_id: ConnId,
    identity: &Identity,
    text: &str,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(
                "Dropping malformed frame from connection {}: {}",
                conn_id,
                e
            );
            return;
        }
    };

    match frame {
        ClientFrame::Auth { .. } => {
            tracing::debug!("Ignoring duplicate auth from connection {}", conn_id);
        }
        ClientFrame::JoinChat {
            customer_id,
            shop_id,
            product_id,
        } => {
            // Advisory presence only; message attribution works by key.
            tracing::info!(
                "'{}' joined chat ({}, {}, product {:?})",
                identity.user_id,
                customer_id,
                shop_id,
                product_id
            );
        }
        ClientFrame::LeaveChat {
            customer_id,
            shop_id,
        } => {
            tracing::info!(
                "'{}' left chat ({}, {})",
                identity.user_id,
                customer_id,
                shop_id
            );
        }
        ClientFrame::MessageRead {
            message_id,
            customer_id,
            shop_id,
        } => {
            let marked = {
                let mut store = state.store.lock().await;
                store.mark_message_read(&message_id)
            };
            match marked {
                Ok(_) => {
                    state
                        .pusher
                        .broadcast_all(ServerFrame::MessageReadUpdated {
                            message_id,
                            customer_id,
                            shop_id,
                            reader_id: identity.user_id.clone(),
                        })
                        .await;
                }
                Err(e) => tracing::warn!("message_read from connection {} failed: {}", conn_id, e),
            }
        }
    }
}
