//! Pure helpers over the connection registry.
//!
//! Side-effect-free functions used by the handlers and the debug endpoint,
//! kept separate so they can be tested without sockets.

use std::collections::HashMap;

use agora_shared::model::{Identity, UserRole};

use crate::state::{ClientConn, ConnId};

/// Validate an auth identity. Returns the reason for rejection, if any.
pub fn auth_rejection(identity: &Identity) -> Option<String> {
    if identity.user_id.trim().is_empty() {
        return Some("user_id must not be empty".to_string());
    }
    if identity.role == UserRole::Merchant && identity.shop_id.is_none() {
        return Some("merchant connections require a shop_id".to_string());
    }
    None
}

/// Snapshot of connected identities, sorted by connection id for stable
/// output.
pub fn connected_identities(registry: &HashMap<ConnId, ClientConn>) -> Vec<(ConnId, Identity)> {
    let mut list: Vec<(ConnId, Identity)> = registry
        .iter()
        .map(|(conn_id, conn)| (*conn_id, conn.identity.clone()))
        .collect();
    list.sort_by_key(|(conn_id, _)| *conn_id);
    list
}
