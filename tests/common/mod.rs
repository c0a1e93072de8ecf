//! Integration test common infrastructure.
//!
//! Provides utilities for running an in-process test server, creating test
//! clients, and asserting on chat output.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
