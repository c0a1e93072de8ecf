//! Connection and fan-out limits configuration.

use serde::Deserialize;
use std::time::Duration;

/// Connection and fan-out limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Deadline for a single write to a client, in seconds (default: 10).
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Longest accepted input line in bytes (default: 4096).
    /// A longer line ends the session.
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Maximum fan-out writes in flight across the whole server (default: 1024).
    #[serde(default = "default_max_inflight_sends")]
    pub max_inflight_sends: usize,
}

impl LimitsConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            write_timeout_secs: default_write_timeout_secs(),
            max_line_length: default_max_line_length(),
            max_inflight_sends: default_max_inflight_sends(),
        }
    }
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_max_line_length() -> usize {
    4096
}

fn default_max_inflight_sends() -> usize {
    1024
}
