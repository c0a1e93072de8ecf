//! The Registry - connected clients, room subscriptions and ignore lists.
//!
//! All of it sits behind one reader/writer lock. Writers (register,
//! unregister, room and ignore changes) update a client's room set and the
//! room's member set within the same write acquisition, so the two views
//! always agree. Broadcast enumeration takes the read lock only long enough
//! to build its delivery list.
//!
//! Rooms reference their members by name and resolve the connection through
//! the client table, so a client removed mid-broadcast simply stops being
//! found instead of leaving a dangling handle behind.

use crate::error::RegistryError;
use crate::journal::RecordSink;
use crate::state::fanout::{Delivery, Fanout};
use crate::state::{Client, ConnectionHandle, FanoutLimits, FanoutReport};
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The room every client joins on registration.
pub const META_ROOM: &str = "default";

#[derive(Default)]
struct Directory {
    clients: HashMap<String, Client>,
    /// Room name to member names.
    rooms: HashMap<String, HashSet<String>>,
}

impl Directory {
    fn join(&mut self, name: &str, room: &str) -> bool {
        let Some(client) = self.clients.get_mut(name) else {
            return false;
        };
        // Add only when absent; an existing membership is left as is.
        if !client.rooms.insert(room.to_string()) {
            return false;
        }
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(name.to_string());
        true
    }

    fn leave(&mut self, name: &str, room: &str) -> bool {
        let Some(client) = self.clients.get_mut(name) else {
            return false;
        };
        if !client.rooms.remove(room) {
            return false;
        }
        self.detach_member(name, room);
        true
    }

    fn detach_member(&mut self, name: &str, room: &str) {
        let now_empty = match self.rooms.get_mut(room) {
            Some(members) => {
                members.remove(name);
                members.is_empty()
            }
            None => false,
        };
        if now_empty && room != META_ROOM {
            self.rooms.remove(room);
        }
    }
}

/// Concurrency-safe store of clients, rooms and the ignore relation.
pub struct Registry {
    directory: RwLock<Directory>,
    audit: Arc<dyn RecordSink>,
    fanout: Fanout,
}

impl Registry {
    /// Create a registry whose broadcasts are also handed to `audit`.
    pub fn new(audit: Arc<dyn RecordSink>, limits: FanoutLimits) -> Self {
        let mut directory = Directory::default();
        directory.rooms.insert(META_ROOM.to_string(), HashSet::new());
        Self {
            directory: RwLock::new(directory),
            audit,
            fanout: Fanout::new(limits),
        }
    }

    /// Whether `name` belongs to a registered client.
    pub fn is_registered(&self, name: &str) -> bool {
        self.directory.read().clients.contains_key(name)
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.directory.read().clients.len()
    }

    /// Register a client and place it in the meta room.
    ///
    /// Fails without touching any state when the name is taken or the
    /// connection handle is already closed.
    pub fn register(&self, name: &str, conn: Arc<ConnectionHandle>) -> Result<(), RegistryError> {
        let mut directory = self.directory.write();
        if directory.clients.contains_key(name) {
            return Err(RegistryError::DuplicateClient(name.to_string()));
        }
        if conn.is_closed() {
            return Err(RegistryError::MissingConnection(name.to_string()));
        }

        let peer = conn.peer().to_string();
        directory
            .clients
            .insert(name.to_string(), Client::new(name.to_string(), conn));
        directory.join(name, META_ROOM);
        info!(name = %name, peer = %peer, "Client registered");
        Ok(())
    }

    /// Add `name` to `room`, creating the room if needed.
    ///
    /// Returns `false` when nothing changed (already a member, or unknown client).
    pub fn join_room(&self, name: &str, room: &str) -> bool {
        self.directory.write().join(name, room)
    }

    /// Remove `name` from `room`.
    ///
    /// Returns `false` when nothing changed (not a member, or unknown client).
    pub fn leave_room(&self, name: &str, room: &str) -> bool {
        self.directory.write().leave(name, room)
    }

    /// Move `name` from `from` to `to` in one step.
    ///
    /// Returns `false` for an unknown client.
    pub fn change_room(&self, name: &str, from: &str, to: &str) -> bool {
        let mut directory = self.directory.write();
        if !directory.clients.contains_key(name) {
            return false;
        }
        directory.leave(name, from);
        directory.join(name, to);
        debug!(name = %name, from = %from, to = %to, "Room changed");
        true
    }

    /// Remove a client from every room it belongs to and from the client table.
    ///
    /// Safe to call for unknown names and more than once.
    pub fn unregister(&self, name: &str) -> bool {
        let mut directory = self.directory.write();
        let Some(client) = directory.clients.remove(name) else {
            return false;
        };
        for room in &client.rooms {
            directory.detach_member(name, room);
        }
        info!(name = %name, rooms = client.rooms.len(), "Client unregistered");
        true
    }

    /// Stop delivering messages from `other` to `name`.
    pub fn set_ignore(&self, name: &str, other: &str) -> bool {
        let mut directory = self.directory.write();
        match directory.clients.get_mut(name) {
            Some(client) => client.ignoring.insert(other.to_string()),
            None => false,
        }
    }

    /// Resume delivering messages from `other` to `name`.
    pub fn clear_ignore(&self, name: &str, other: &str) -> bool {
        let mut directory = self.directory.write();
        match directory.clients.get_mut(name) {
            Some(client) => client.ignoring.remove(other),
            None => false,
        }
    }

    /// Whether `name` currently ignores `other`.
    pub fn is_ignoring(&self, name: &str, other: &str) -> bool {
        self.directory
            .read()
            .clients
            .get(name)
            .is_some_and(|client| client.is_ignoring(other))
    }

    /// Members of `room`, sorted by name.
    pub fn room_members(&self, room: &str) -> Vec<String> {
        let directory = self.directory.read();
        let mut members: Vec<String> = directory
            .rooms
            .get(room)
            .map(|members| members.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Rooms `name` belongs to, sorted, or `None` for an unknown client.
    pub fn rooms_of(&self, name: &str) -> Option<Vec<String>> {
        let directory = self.directory.read();
        let client = directory.clients.get(name)?;
        let mut rooms: Vec<String> = client.rooms.iter().cloned().collect();
        rooms.sort();
        Some(rooms)
    }

    /// Journal `payload`, then send it to every member of `room` except the
    /// sender and members ignoring the sender.
    ///
    /// Membership is read once; a client joining while this runs may or may
    /// not receive the message. Deliveries are best effort and at most once:
    /// failures are logged and never reported back to the sender.
    pub async fn broadcast(
        &self,
        cancel: &CancellationToken,
        sender: &str,
        room: &str,
        payload: Bytes,
    ) -> FanoutReport {
        if let Err(e) = self.audit.append(payload.clone()).await {
            warn!(error = %e, code = e.error_code(), "Failed to journal broadcast");
        }

        let mut report = FanoutReport::default();
        let deliveries = {
            let directory = self.directory.read();
            let Some(members) = directory.rooms.get(room) else {
                return report;
            };
            let mut deliveries = Vec::with_capacity(members.len());
            for member in members {
                if member == sender {
                    continue;
                }
                let Some(client) = directory.clients.get(member) else {
                    continue;
                };
                if client.is_ignoring(sender) {
                    report.suppressed += 1;
                    continue;
                }
                deliveries.push(Delivery {
                    recipient: member.clone(),
                    conn: Arc::clone(&client.conn),
                });
            }
            deliveries
        };

        report.scheduled = deliveries.len();
        self.fanout.dispatch(deliveries, payload, cancel);
        debug!(
            sender = %sender,
            room = %room,
            scheduled = report.scheduled,
            suppressed = report.suppressed,
            "Broadcast dispatched"
        );
        report
    }

    /// Close every registered client's connection.
    ///
    /// Only used while shutting down; clients stay in the table.
    pub async fn close_all_connections(&self) {
        let conns: Vec<Arc<ConnectionHandle>> = self
            .directory
            .read()
            .clients
            .values()
            .map(|client| Arc::clone(&client.conn))
            .collect();
        info!(count = conns.len(), "Closing all client connections");
        for conn in conns {
            conn.close().await;
        }
    }
}
