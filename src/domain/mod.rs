//! Domain types for the benchmark: transaction records, feed frames, and the
//! ports the application layer talks to.

pub mod event;
pub mod ports;
pub mod snapshot;
pub mod transaction;
