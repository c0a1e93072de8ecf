//! Message journal configuration.

use serde::Deserialize;
use std::time::Duration;

/// Durable message journal configuration.
///
/// Records are batched in memory and written out when the flush interval
/// elapses, the buffer reaches `flush_threshold` bytes, or a flush is
/// requested explicitly.
#[derive(Debug, Clone, Deserialize)]
pub struct JournalConfig {
    /// Journal file path (default: "telchat.log").
    #[serde(default = "default_path")]
    pub path: String,
    /// Timer flush interval in milliseconds (default: 200).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// Buffer size in bytes that forces a flush (default: 1024).
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    /// Pending record queue capacity (default: 100).
    /// A full queue blocks appenders.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Also journal every payload handed to the registry fan-out
    /// (default: false; sessions already journal an undecorated record).
    #[serde(default)]
    pub audit_broadcasts: bool,
}

impl JournalConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            flush_interval_ms: default_flush_interval_ms(),
            flush_threshold: default_flush_threshold(),
            queue_capacity: default_queue_capacity(),
            audit_broadcasts: false,
        }
    }
}

fn default_path() -> String {
    "telchat.log".to_string()
}

fn default_flush_interval_ms() -> u64 {
    200
}

fn default_flush_threshold() -> usize {
    1024
}

fn default_queue_capacity() -> usize {
    100
}
