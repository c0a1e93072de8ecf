//! Per-recipient delivery for room broadcasts.
//!
//! Every recipient connection gets one outbox writer task that sends queued
//! payloads in arrival order, so a slow or dead client only ever delays
//! itself. A shared semaphore caps how many writes are in flight at once;
//! writers waiting for a permit hold no registry lock.

use crate::config::LimitsConfig;
use crate::state::ConnectionHandle;
use super::connection::Outbound;
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Payloads one recipient may have queued before new ones are dropped.
const OUTBOX_DEPTH: usize = 256;

/// Limits applied to fan-out delivery.
#[derive(Debug, Clone, Copy)]
pub struct FanoutLimits {
    /// Deadline for one write to one recipient.
    pub write_timeout: Duration,
    /// Maximum recipient writes in flight across the whole registry.
    pub max_inflight_sends: usize,
}

impl Default for FanoutLimits {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(10),
            max_inflight_sends: 1024,
        }
    }
}

impl From<&LimitsConfig> for FanoutLimits {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            write_timeout: limits.write_timeout(),
            max_inflight_sends: limits.max_inflight_sends,
        }
    }
}

/// Outcome of one broadcast call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// Delivery attempts scheduled (one per eligible subscriber).
    pub scheduled: usize,
    /// Subscribers skipped because they ignore the sender.
    pub suppressed: usize,
}

/// A single scheduled delivery.
pub(super) struct Delivery {
    pub recipient: String,
    pub conn: Arc<ConnectionHandle>,
}

/// Queues payloads on recipient outboxes, bounded by a shared semaphore.
pub(super) struct Fanout {
    permits: Arc<Semaphore>,
    write_timeout: Duration,
}

impl Fanout {
    pub fn new(limits: FanoutLimits) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(limits.max_inflight_sends.max(1))),
            write_timeout: limits.write_timeout,
        }
    }

    /// Queue the payload for every delivery. Never waits.
    ///
    /// A recipient whose outbox is full loses this payload.
    pub fn dispatch(&self, deliveries: Vec<Delivery>, payload: Bytes, cancel: &CancellationToken) {
        for delivery in deliveries {
            let Some(tx) = delivery.conn.outbox(|| self.start_writer(&delivery)) else {
                debug!(recipient = %delivery.recipient, "Recipient closed, send skipped");
                continue;
            };
            let outbound = Outbound {
                payload: payload.clone(),
                cancel: cancel.clone(),
            };
            match tx.try_send(outbound) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!(
                    recipient = %delivery.recipient,
                    peer = %delivery.conn.peer(),
                    "Outbox full, message dropped for recipient"
                ),
                Err(TrySendError::Closed(_)) => {
                    debug!(recipient = %delivery.recipient, "Outbox closed, send skipped");
                }
            }
        }
    }

    /// Spawn the writer that drains one recipient's outbox in order.
    fn start_writer(&self, delivery: &Delivery) -> mpsc::Sender<Outbound> {
        let (tx, mut rx) = mpsc::channel::<Outbound>(OUTBOX_DEPTH);
        // Weak so the writer never keeps a dropped connection alive.
        let conn = Arc::downgrade(&delivery.conn);
        let recipient = delivery.recipient.clone();
        let permits = Arc::clone(&self.permits);
        let write_timeout = self.write_timeout;

        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                let Some(conn) = conn.upgrade() else {
                    break;
                };
                let Ok(_permit) = permits.acquire().await else {
                    break;
                };
                // Checked once; a write already underway is not aborted.
                if outbound.cancel.is_cancelled() {
                    debug!(recipient = %recipient, "Broadcast cancelled, send skipped");
                    continue;
                }
                if let Err(e) = conn.send(&outbound.payload, write_timeout).await {
                    warn!(
                        recipient = %recipient,
                        peer = %conn.peer(),
                        error = %e,
                        code = e.error_code(),
                        "Message dropped for recipient"
                    );
                }
            }
            debug!(recipient = %recipient, "Outbox writer finished");
        });
        tx
    }
}
