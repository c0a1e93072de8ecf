//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// Chat listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:4000").
    pub address: SocketAddr,
}

/// REST adapter listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub address: SocketAddr,
}
