//! Network module.
//!
//! Contains the Gateway (TCP listener), the per-connection Session driver,
//! and the line protocol it speaks.

mod gateway;
pub mod protocol;
mod session;

pub use gateway::Gateway;
pub use session::{Session, SessionExit, SessionReport, SessionSettings, SessionShared};
