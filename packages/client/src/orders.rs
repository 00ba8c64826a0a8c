//! Role-filtered order-update feed.
//!
//! The server broadcasts every order status change to every connected
//! client; entitlement is enforced by the subscriber's own filter. Each
//! dashboard attaches a feed with the scope of its role. The filter
//! predicate is the correctness boundary, so it lives here in one place
//! and is tested per role.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use agora_shared::frame::ServerFrame;
use agora_shared::model::{Identity, OrderUpdate, UserRole};

use crate::socket::ConnectionManager;

/// Which order updates a subscriber is entitled to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleScope {
    /// A customer sees only its own orders.
    Customer { customer_id: String },
    /// A merchant sees only its shop's orders.
    Merchant { shop_id: String },
    /// Admin dashboards see everything.
    Admin,
}

impl RoleScope {
    /// Derive the scope for a connection identity. Merchants without a
    /// shop id have no order entitlement at all.
    pub fn for_identity(identity: &Identity) -> Option<Self> {
        match identity.role {
            UserRole::Customer => Some(RoleScope::Customer {
                customer_id: identity.user_id.clone(),
            }),
            UserRole::Merchant => identity.shop_id.clone().map(|shop_id| RoleScope::Merchant { shop_id }),
            UserRole::Admin => Some(RoleScope::Admin),
        }
    }

    /// The filter predicate.
    pub fn accepts(&self, update: &OrderUpdate) -> bool {
        match self {
            RoleScope::Customer { customer_id } => update.customer_id == *customer_id,
            RoleScope::Merchant { shop_id } => update.shop_id == *shop_id,
            RoleScope::Admin => true,
        }
    }
}

/// A running order feed. Dropping it detaches from the connection.
pub struct OrderFeed {
    pump: JoinHandle<()>,
}

impl OrderFeed {
    /// Subscribe to the shared connection and yield the updates the scope
    /// accepts.
    pub fn attach(
        manager: &ConnectionManager,
        scope: RoleScope,
    ) -> (Self, mpsc::UnboundedReceiver<OrderUpdate>) {
        let mut subscription = manager.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(async move {
            while let Some(frame) = subscription.recv().await {
                if let ServerFrame::OrderStatusUpdated { payload } = frame {
                    if !scope.accepts(&payload) {
                        continue;
                    }
                    if tx.send(payload).is_err() {
                        break;
                    }
                }
            }
        });

        (Self { pump }, rx)
    }
}

impl Drop for OrderFeed {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
