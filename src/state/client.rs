//! Registered client record.

use crate::state::ConnectionHandle;
use std::collections::HashSet;
use std::sync::Arc;

/// A registered chat client.
///
/// The client record is the only owner of the connection handle inside the
/// registry; rooms refer to their members by name.
#[derive(Debug)]
pub struct Client {
    /// Unique, case-sensitive display name. Fixed for the connection's life.
    pub name: String,
    /// Write handle for this client's connection.
    pub conn: Arc<ConnectionHandle>,
    /// Rooms this client belongs to. Never empty while registered.
    pub rooms: HashSet<String>,
    /// Names whose messages this client does not want delivered.
    pub ignoring: HashSet<String>,
}

impl Client {
    pub fn new(name: String, conn: Arc<ConnectionHandle>) -> Self {
        Self {
            name,
            conn,
            rooms: HashSet::new(),
            ignoring: HashSet::new(),
        }
    }

    /// Whether messages from `sender` are suppressed for this client.
    #[inline]
    pub fn is_ignoring(&self, sender: &str) -> bool {
        self.ignoring.contains(sender)
    }
}
