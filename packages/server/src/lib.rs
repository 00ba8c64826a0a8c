//! Broadcast relay server for the Agora marketplace.
//!
//! Persists messages and orders in memory, serves the REST endpoints the
//! client consumes, and pushes every mutation to all connected WebSocket
//! clients. Delivery scoping is deliberately absent: clients filter the
//! shared frame stream themselves (broadcast-and-filter).

pub mod handler;
pub mod pusher;
pub mod registry;
pub mod runner;
pub mod signal;
pub mod state;
pub mod store;

pub use runner::{build_router, build_state, run_server, serve_on};
