//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("journal.path is required")]
    MissingJournalPath,
    #[error("journal.path parent directory does not exist: {0}")]
    JournalPathInvalid(String),
    #[error("journal.flush_interval_ms must be greater than zero")]
    ZeroFlushInterval,
    #[error("journal.flush_threshold must be greater than zero")]
    ZeroFlushThreshold,
    #[error("journal.queue_capacity must be greater than zero")]
    ZeroQueueCapacity,
    #[error("limits.write_timeout_secs must be greater than zero")]
    ZeroWriteTimeout,
    #[error("limits.max_line_length must be greater than zero")]
    ZeroLineLength,
    #[error("limits.max_inflight_sends must be greater than zero")]
    ZeroInflightSends,
    #[error("http.address and listen.address must differ, both are {0}")]
    AddressConflict(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    // Journal
    let journal = &config.journal;
    if journal.path.is_empty() {
        errors.push(ValidationError::MissingJournalPath);
    } else {
        let path = Path::new(&journal.path);
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            errors.push(ValidationError::JournalPathInvalid(journal.path.clone()));
        }
    }
    if journal.flush_interval_ms == 0 {
        errors.push(ValidationError::ZeroFlushInterval);
    }
    if journal.flush_threshold == 0 {
        errors.push(ValidationError::ZeroFlushThreshold);
    }
    if journal.queue_capacity == 0 {
        errors.push(ValidationError::ZeroQueueCapacity);
    }

    // Limits
    let limits = &config.limits;
    if limits.write_timeout_secs == 0 {
        errors.push(ValidationError::ZeroWriteTimeout);
    }
    if limits.max_line_length == 0 {
        errors.push(ValidationError::ZeroLineLength);
    }
    if limits.max_inflight_sends == 0 {
        errors.push(ValidationError::ZeroInflightSends);
    }

    // Listeners (port 0 asks the OS for a fresh port each time)
    if let Some(http) = &config.http
        && http.address == config.listen.address
        && http.address.port() != 0
    {
        errors.push(ValidationError::AddressConflict(http.address.to_string()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
