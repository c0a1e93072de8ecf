//! Gateway - TCP listener that accepts incoming connections.
//!
//! Each accepted stream gets its own [`Session`] task. Once the shutdown flag
//! is set, streams that still make it through `accept` are dropped on the
//! spot.

use crate::network::session::{Session, SessionShared};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, instrument};

/// Pause after a failed accept (e.g. descriptor exhaustion) before retrying.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// The Gateway accepts TCP connections and spawns sessions.
pub struct Gateway {
    listener: TcpListener,
    shared: SessionShared,
    stop: CancellationToken,
    in_shutdown: Arc<AtomicBool>,
    sessions: TaskTracker,
}

impl Gateway {
    pub fn new(
        listener: TcpListener,
        shared: SessionShared,
        stop: CancellationToken,
        in_shutdown: Arc<AtomicBool>,
        sessions: TaskTracker,
    ) -> Self {
        Self {
            listener,
            shared,
            stop,
            in_shutdown,
            sessions,
        }
    }

    /// Accept connections until `stop` is cancelled. The listener is closed
    /// when this returns.
    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "Accepting connections");
        }

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, addr)) => {
                    if self.in_shutdown.load(Ordering::Acquire) {
                        info!(%addr, "Connection refused, shutting down");
                        drop(stream);
                        continue;
                    }
                    info!(%addr, "Connection accepted");

                    let session = Session::new(self.shared.clone(), stream, addr.to_string());
                    self.sessions.spawn(async move {
                        session.run().await;
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }

        info!("Listener closed");
    }
}
