//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Top-level config struct and server identity (Config, ServerConfig)
//! - [`listen`]: Network listener configuration (ListenConfig, HttpConfig)
//! - [`journal`]: Durable message journal configuration (JournalConfig)
//! - [`limits`]: Connection and fan-out limits (LimitsConfig)
//! - [`validation`]: Startup validation

mod journal;
mod limits;
mod listen;
mod types;
mod validation;

pub use journal::JournalConfig;
pub use limits::LimitsConfig;
pub use listen::{HttpConfig, ListenConfig};
pub use types::{Config, ConfigError, LogFormat, ServerConfig};
pub use validation::{ValidationError, validate};
