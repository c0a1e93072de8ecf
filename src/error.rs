//! Unified error handling for telchat.
//!
//! Each concern gets its own error enum so callers can tell a recoverable
//! protocol problem apart from an I/O failure that ends a session. Every enum
//! exposes a static `error_code()` for structured log labeling.

use std::time::Duration;
use thiserror::Error;
use tokio_util::codec::LinesCodecError;

// ============================================================================
// Registry Errors (registration conflicts)
// ============================================================================

/// Registration failures. No registry state is mutated when one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("duplicate client: {0}")]
    DuplicateClient(String),

    #[error("no usable connection for client: {0}")]
    MissingConnection(String),
}

impl RegistryError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateClient(_) => "duplicate_client",
            Self::MissingConnection(_) => "missing_connection",
        }
    }
}

// ============================================================================
// Command Errors (protocol errors, recovered locally)
// ============================================================================

/// A malformed slash command. Reported to the offending client; the session
/// keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("invalid command: {0}")]
    Malformed(String),
}

impl CommandError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed_command",
        }
    }

    /// The raw line that failed to parse.
    pub fn line(&self) -> &str {
        match self {
            Self::Malformed(line) => line,
        }
    }
}

// ============================================================================
// Session Errors (connection I/O, fatal to the session)
// ============================================================================

/// Connection-level failures. Any of these terminates the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write deadline of {0:?} exceeded")]
    WriteTimeout(Duration),

    #[error("connection closed")]
    Closed,

    #[error("line read failed: {0}")]
    Codec(#[from] LinesCodecError),
}

impl SessionError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::WriteTimeout(_) => "write_timeout",
            Self::Closed => "closed",
            Self::Codec(_) => "codec",
        }
    }
}

// ============================================================================
// Journal Errors (durable log)
// ============================================================================

/// Durable log failures.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("journal is closed")]
    Closed,

    /// The background writer hit an unrecoverable write error.
    #[error("journal writer failed: {0}")]
    WorkerFailed(String),
}

impl JournalError {
    /// Get a static error code string for log labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Closed => "closed",
            Self::WorkerFailed(_) => "worker_failed",
        }
    }
}
