//! Server state and connection bookkeeping.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, mpsc};

use agora_shared::model::Identity;

use crate::pusher::FramePusher;
use crate::store::MarketStore;

/// Connection id, unique per process.
pub type ConnId = u64;

/// Bookkeeping for one authenticated WebSocket connection.
pub struct ClientConn {
    pub identity: Identity,
    /// Unix timestamp when connected (milliseconds).
    pub connected_at: i64,
}

/// Shared application state.
pub struct AppState {
    /// Authenticated connections by id.
    pub registry: Mutex<HashMap<ConnId, ClientConn>>,
    /// Outbound frame delivery.
    pub pusher: Arc<dyn FramePusher>,
    /// Messages and orders.
    pub store: Mutex<MarketStore>,
    next_conn_id: AtomicU64,
}

impl AppState {
    pub fn new(pusher: Arc<dyn FramePusher>, store: MarketStore) -> Self {
        Self {
            registry: Mutex::new(HashMap::new()),
            pusher,
            store: Mutex::new(store),
            next_conn_id: AtomicU64::new(1),
        }
    }

    pub fn allocate_conn_id(&self) -> ConnId {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// Per-connection sender channel used by the WebSocket pusher.
pub type ConnSender = mpsc::UnboundedSender<String>;
