//! Shared protocol kernel for the Agora marketplace.
//!
//! This crate defines the wire frames exchanged over the real-time channel,
//! the marketplace entities they carry, and the small utilities (clock,
//! logging setup) both the relay server and the client build on.

pub mod frame;
pub mod logger;
pub mod model;
pub mod time;
