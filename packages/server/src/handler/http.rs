//! REST handlers consumed by the client, plus health and debug endpoints.
//!
//! Every mutation that other clients care about is echoed over the
//! broadcast channel right after it is persisted.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
};
use serde::Deserialize;
use serde_json::json;

use agora_shared::frame::ServerFrame;
use agora_shared::model::{
    MarkReadBody, Message, OrderUpdate, PostMessageBody, ThreadSummary, UpdateOrderStatusBody,
};

use crate::registry::connected_identities;
use crate::state::AppState;

/// Query parameters for `GET /api/messages`.
#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    pub customer_id: String,
    pub shop_id: String,
    pub product_id: Option<String>,
}

/// Query parameters for `GET /api/chat/threads`.
#[derive(Debug, Deserialize)]
pub struct ThreadsQuery {
    pub user_id: String,
    pub shop_id: Option<String>,
}

pub async fn get_messages(
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> Json<Vec<Message>> {
    let store = state.store.lock().await;
    Json(store.messages_for(
        &query.customer_id,
        &query.shop_id,
        query.product_id.as_deref(),
    ))
}

pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PostMessageBody>,
) -> (StatusCode, Json<Message>) {
    let message = {
        let mut store = state.store.lock().await;
        store.append_message(body)
    };
    tracing::info!(
        "Message {} stored for ({}, {}), broadcasting",
        message.id,
        message.customer_id,
        message.shop_id
    );
    state
        .pusher
        .broadcast_all(ServerFrame::MessageReceived {
            payload: message.clone(),
        })
        .await;
    (StatusCode::CREATED, Json(message))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Json(body): Json<MarkReadBody>,
) -> Json<serde_json::Value> {
    let updated = {
        let mut store = state.store.lock().await;
        store.mark_thread_read(&body.customer_id, &body.shop_id, &body.reader_id)
    };
    // Broadcast regardless of count so every client's view converges.
    state
        .pusher
        .broadcast_all(ServerFrame::MessagesMarkedRead {
            customer_id: body.customer_id,
            shop_id: body.shop_id,
            reader_id: body.reader_id,
        })
        .await;
    Json(json!({ "updated": updated }))
}

pub async fn get_threads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ThreadsQuery>,
) -> Result<Json<Vec<ThreadSummary>>, StatusCode> {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            value
                .strip_prefix("Bearer ")
                .is_some_and(|token| !token.trim().is_empty())
        });
    if !authorized {
        return Err(StatusCode::UNAUTHORIZED);
    }

    tracing::debug!("Thread listing requested by '{}'", query.user_id);
    let store = state.store.lock().await;
    let threads = match &query.shop_id {
        Some(shop_id) => store.threads_for_shop(shop_id),
        None => store.threads_for_customer(&query.user_id),
    };
    Ok(Json(threads))
}

pub async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
    Json(body): Json<UpdateOrderStatusBody>,
) -> Result<Json<OrderUpdate>, (StatusCode, String)> {
    let update = {
        let mut store = state.store.lock().await;
        store.update_order_status(&order_id, body.new_status)
    };
    match update {
        Ok(update) => {
            tracing::info!(
                "Order {} moved {} -> {}, broadcasting",
                update.order_id,
                update.previous_status.as_str(),
                update.new_status.as_str()
            );
            state
                .pusher
                .broadcast_all(ServerFrame::OrderStatusUpdated {
                    payload: update.clone(),
                })
                .await;
            Ok(Json(update))
        }
        Err(e) => Err((StatusCode::NOT_FOUND, e.to_string())),
    }
}

/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Debug endpoint: connected clients (for testing purposes)
pub async fn debug_clients(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let registry = state.registry.lock().await;
    let clients: Vec<serde_json::Value> = connected_identities(&registry)
        .into_iter()
        .map(|(conn_id, identity)| {
            json!({
                "conn_id": conn_id,
                "user_id": identity.user_id,
                "role": identity.role.as_str(),
                "shop_id": identity.shop_id,
            })
        })
        .collect();
    Json(json!({ "count": clients.len(), "clients": clients }))
}

/// Debug endpoint: drop every connection without a close handshake, so
/// clients observe an abnormal closure (for testing reconnects).
pub async fn debug_kick(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let conn_ids: Vec<_> = {
        let mut registry = state.registry.lock().await;
        registry.drain().map(|(conn_id, _)| conn_id).collect()
    };
    for conn_id in &conn_ids {
        state.pusher.unregister(*conn_id).await;
    }
    tracing::info!("Kicked {} connection(s)", conn_ids.len());
    Json(json!({ "kicked": conn_ids.len() }))
}
