//! telchat - multi-room terminal chat daemon.
//!
//! Clients connect over a raw line-oriented TCP stream, pick a name, and
//! chat in named rooms. Relayed messages are recorded in a write-behind
//! journal that an optional HTTP adapter exposes for reading.

pub mod config;
pub mod error;
pub mod http;
pub mod journal;
pub mod network;
pub mod server;
pub mod state;

pub use server::Server;
