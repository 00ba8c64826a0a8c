//! Server assembly and execution.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::trace::TraceLayer;

use agora_shared::model::{OrderSnapshot, OrderStatus};
use agora_shared::time::SystemClock;

use crate::handler::http::{
    debug_clients, debug_kick, get_messages, get_threads, health_check, mark_read, post_message,
    update_order_status,
};
use crate::handler::websocket::websocket_handler;
use crate::pusher::WsFramePusher;
use crate::signal::shutdown_signal;
use crate::state::AppState;
use crate::store::{MarketStore, OrderRecord};

/// Build fresh application state with the system clock.
pub fn build_state() -> Arc<AppState> {
    let pusher = WsFramePusher::new();
    let store = MarketStore::new(Arc::new(SystemClock));
    Arc::new(AppState::new(pusher, store))
}

/// Assemble the router over shared state.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/api/health", get(health_check))
        .route("/api/messages", get(get_messages).post(post_message))
        .route("/api/messages/mark-read", patch(mark_read))
        .route("/api/chat/threads", get(get_threads))
        .route("/api/orders/{order_id}/status", patch(update_order_status))
        .route("/debug/clients", get(debug_clients))
        .route("/debug/kick", post(debug_kick))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve on an already-bound listener. Integration tests bind an ephemeral
/// port themselves and call this directly.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Run the relay server.
///
/// # Arguments
///
/// * `host` - The host address to bind to (e.g., "127.0.0.1")
/// * `port` - The port number to bind to (e.g., 8080)
/// * `seed_demo` - Whether to register a couple of demo orders
pub async fn run_server(
    host: String,
    port: u16,
    seed_demo: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = build_state();
    if seed_demo {
        seed_demo_orders(&state).await;
    }

    let bind_addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    tracing::info!("Agora relay server listening on {}", listener.local_addr()?);
    tracing::info!("Real-time endpoint: ws://{}/ws", bind_addr);
    tracing::info!("Press Ctrl+C to shutdown gracefully");

    serve_on(listener, state).await?;

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// A couple of orders so a demo merchant has something to advance.
async fn seed_demo_orders(state: &Arc<AppState>) {
    let mut store = state.store.lock().await;
    store.seed_order(OrderRecord {
        order_id: "o1".to_string(),
        customer_id: "c1".to_string(),
        shop_id: "s1".to_string(),
        status: OrderStatus::Pending,
        snapshot: OrderSnapshot {
            product_name: "Sourdough loaf".to_string(),
            shop_name: "Corner Bakery".to_string(),
            quantity: 2,
            unit_price: 650,
        },
    });
    store.seed_order(OrderRecord {
        order_id: "o2".to_string(),
        customer_id: "c2".to_string(),
        shop_id: "s1".to_string(),
        status: OrderStatus::Pending,
        snapshot: OrderSnapshot {
            product_name: "Rye bread".to_string(),
            shop_name: "Corner Bakery".to_string(),
            quantity: 1,
            unit_price: 480,
        },
    });
    tracing::info!("Seeded 2 demo orders for shop 's1'");
}
