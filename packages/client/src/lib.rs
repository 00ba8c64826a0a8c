//! Real-time client for the Agora marketplace.
//!
//! The heart of this crate is the [`socket::ConnectionManager`]: one logical
//! WebSocket connection per process, shared by every consumer through
//! subscriptions. On top of it sit the per-conversation chat session
//! ([`chat::LiveChat`]) with its optimistic send pipeline, the merchant/
//! customer thread book, and the role-filtered order-update feed
//! ([`orders::OrderFeed`]). REST calls go through [`api::ApiClient`].

pub mod api;
pub mod chat;
pub mod console;
pub mod error;
pub mod orders;
pub mod socket;

pub use error::ClientError;
