//! State management module.
//!
//! Contains the Registry (clients, rooms and the ignore relation), the
//! fan-out engine it drives, and the shared connection write handle.

mod client;
mod connection;
mod fanout;
mod registry;

pub use client::Client;
pub use connection::ConnectionHandle;
pub use fanout::{FanoutLimits, FanoutReport};
pub use registry::{META_ROOM, Registry};
