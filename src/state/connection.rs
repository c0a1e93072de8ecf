//! Outbound half of a client connection.
//!
//! The session task owns the read half of a stream; everything that writes to
//! the client (the session's own replies and registry fan-out) goes through one
//! shared [`ConnectionHandle`]. The internal lock serializes writers so two
//! payloads never interleave on the wire.
//!
//! Fan-out payloads additionally pass through a per-connection outbox: a
//! bounded queue drained by a single writer task, so broadcasts reach each
//! recipient in the order they were sent.

use crate::error::SessionError;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One fan-out payload waiting in an outbox.
pub(crate) struct Outbound {
    pub payload: Bytes,
    pub cancel: CancellationToken,
}

enum Outbox {
    /// No broadcast has reached this connection yet.
    Idle,
    Open(mpsc::Sender<Outbound>),
    Closed,
}

/// Shared write handle for one client connection.
pub struct ConnectionHandle {
    peer: String,
    writer: Mutex<Option<BoxedWriter>>,
    outbox: SyncMutex<Outbox>,
    closed: AtomicBool,
}

impl ConnectionHandle {
    /// Wrap the write half of a connection.
    pub fn new<W>(peer: impl Into<String>, writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            peer: peer.into(),
            writer: Mutex::new(Some(Box::new(writer))),
            outbox: SyncMutex::new(Outbox::Idle),
            closed: AtomicBool::new(false),
        }
    }

    /// Remote peer label (usually the socket address).
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Write `payload` unbuffered within `deadline`.
    ///
    /// The deadline covers waiting for other writers as well as the write
    /// itself. A payload that misses it is dropped; nothing is retried.
    pub async fn send(&self, payload: &[u8], deadline: Duration) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }
        let write = async {
            let mut guard = self.writer.lock().await;
            let writer = guard.as_mut().ok_or(SessionError::Closed)?;
            writer.write_all(payload).await?;
            writer.flush().await?;
            Ok(())
        };
        match tokio::time::timeout(deadline, write).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::WriteTimeout(deadline)),
        }
    }

    /// Sender for this connection's outbox, started by `start` on first use.
    ///
    /// `None` once the connection is closed.
    pub(crate) fn outbox<F>(&self, start: F) -> Option<mpsc::Sender<Outbound>>
    where
        F: FnOnce() -> mpsc::Sender<Outbound>,
    {
        let mut outbox = self.outbox.lock();
        match &*outbox {
            Outbox::Open(tx) => Some(tx.clone()),
            Outbox::Closed => None,
            Outbox::Idle => {
                if self.is_closed() {
                    *outbox = Outbox::Closed;
                    return None;
                }
                let tx = start();
                *outbox = Outbox::Open(tx.clone());
                Some(tx)
            }
        }
    }

    /// Shut the write side down. Idempotent.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Dropping the sender lets the outbox writer wind down.
        *self.outbox.lock() = Outbox::Closed;
        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer
            && let Err(e) = writer.shutdown().await
        {
            debug!(peer = %self.peer, error = %e, "Connection shutdown failed");
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.peer)
            .field("closed", &self.is_closed())
            .finish()
    }
}
