//! Adapters for the domain ports.

pub mod channel;
pub mod http;
pub mod in_memory;
pub mod websocket;
