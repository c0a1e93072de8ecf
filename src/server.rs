//! Server lifecycle: wiring, startup and orderly shutdown.
//!
//! [`Server::bind`] opens the journal and binds the listeners,
//! [`Server::start`] spawns the accept loop (and the HTTP adapter when
//! configured), and [`Server::shutdown`] tears everything down in a fixed
//! order:
//!
//! 1. set the shutdown flag so late accepts are refused
//! 2. stop the accept loop, closing the listener
//! 3. end every session and close every client connection
//! 4. flush the journal, then close it
//! 5. stop the HTTP adapter
//!
//! No client can register after step 2, so nothing races the journal close.

use crate::config::Config;
use crate::error::JournalError;
use crate::http::{self, HttpState};
use crate::journal::{DiscardSink, Journal, RecordSink};
use crate::network::{Gateway, SessionSettings, SessionShared};
use crate::state::{FanoutLimits, Registry};
use parking_lot::Mutex as SyncMutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// How long shutdown waits for session tasks to wind down.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Listeners bound but not yet handed to their tasks.
struct Listeners {
    chat: TcpListener,
    http: Option<TcpListener>,
}

#[derive(Default)]
struct Tasks {
    gateway: Option<JoinHandle<()>>,
    http: Option<JoinHandle<()>>,
}

/// A running (or ready to run) chat server.
pub struct Server {
    registry: Arc<Registry>,
    journal: Arc<Journal>,
    shared: SessionShared,
    local_addr: SocketAddr,
    http_addr: Option<SocketAddr>,
    listeners: SyncMutex<Option<Listeners>>,
    tasks: SyncMutex<Tasks>,
    accept_stop: CancellationToken,
    http_stop: CancellationToken,
    in_shutdown: Arc<AtomicBool>,
    sessions: TaskTracker,
    /// Held for the whole shutdown sequence; `true` once it has completed.
    shutdown_done: Mutex<bool>,
}

impl Server {
    /// Open the journal, build the registry and bind every listener.
    pub async fn bind(config: &Config) -> anyhow::Result<Self> {
        let journal = Arc::new(Journal::from_config(&config.journal).await?);

        let audit: Arc<dyn RecordSink> = if config.journal.audit_broadcasts {
            Arc::clone(&journal) as Arc<dyn RecordSink>
        } else {
            Arc::new(DiscardSink)
        };
        let registry = Arc::new(Registry::new(audit, FanoutLimits::from(&config.limits)));

        let chat = TcpListener::bind(config.listen.address).await?;
        let local_addr = chat.local_addr()?;
        info!(address = %local_addr, "Chat listener bound");

        let (http, http_addr) = match &config.http {
            Some(http_config) => {
                let listener = TcpListener::bind(http_config.address).await?;
                let addr = listener.local_addr()?;
                info!(address = %addr, "HTTP listener bound");
                (Some(listener), Some(addr))
            }
            None => (None, None),
        };

        let shared = SessionShared::new(
            Arc::clone(&registry),
            journal.clone(),
            SessionSettings::from(&config.limits),
            CancellationToken::new(),
        );

        Ok(Self {
            registry,
            journal,
            shared,
            local_addr,
            http_addr,
            listeners: SyncMutex::new(Some(Listeners { chat, http })),
            tasks: SyncMutex::new(Tasks::default()),
            accept_stop: CancellationToken::new(),
            http_stop: CancellationToken::new(),
            in_shutdown: Arc::new(AtomicBool::new(false)),
            sessions: TaskTracker::new(),
            shutdown_done: Mutex::new(false),
        })
    }

    /// Spawn the accept loop and, when configured, the HTTP adapter.
    ///
    /// Calling it again, or after shutdown, does nothing.
    pub fn start(&self) {
        if self.is_shutting_down() {
            return;
        }
        let Some(listeners) = self.listeners.lock().take() else {
            return;
        };

        let gateway = Gateway::new(
            listeners.chat,
            self.shared.clone(),
            self.accept_stop.clone(),
            Arc::clone(&self.in_shutdown),
            self.sessions.clone(),
        );
        let gateway_task = tokio::spawn(gateway.run());

        let http_task = listeners.http.map(|listener| {
            let state = HttpState {
                registry: Arc::clone(&self.registry),
                journal: Arc::clone(&self.journal),
            };
            let stop = self.http_stop.clone();
            tokio::spawn(async move {
                if let Err(e) = http::serve(listener, state, stop).await {
                    error!(error = %e, "HTTP server error");
                }
            })
        });

        let mut tasks = self.tasks.lock();
        tasks.gateway = Some(gateway_task);
        tasks.http = http_task;
    }

    /// Stop accepting, close every connection, then flush and close the
    /// journal.
    ///
    /// Idempotent. Reports the journal's flush or close failure, if any;
    /// the rest of the sequence runs regardless.
    pub async fn shutdown(&self) -> Result<(), JournalError> {
        let mut done = self.shutdown_done.lock().await;
        if *done {
            return Ok(());
        }

        self.in_shutdown.store(true, Ordering::Release);
        info!(clients = self.registry.client_count(), "Shutting down");

        // Listener
        self.accept_stop.cancel();
        self.listeners.lock().take();
        let gateway = self.tasks.lock().gateway.take();
        if let Some(gateway) = gateway
            && let Err(e) = gateway.await
        {
            warn!(error = %e, "Accept loop ended abnormally");
        }

        // Live connections
        self.shared.shutdown.cancel();
        self.registry.close_all_connections().await;
        self.sessions.close();
        if tokio::time::timeout(SESSION_DRAIN_TIMEOUT, self.sessions.wait())
            .await
            .is_err()
        {
            warn!(
                remaining = self.sessions.len(),
                "Sessions still running after drain timeout"
            );
        }

        // Journal
        let flushed = self.journal.flush().await;
        if let Err(e) = &flushed {
            error!(error = %e, code = e.error_code(), "Final journal flush failed");
        }
        let closed = self.journal.close().await;
        if let Err(e) = &closed {
            error!(error = %e, code = e.error_code(), "Journal close failed");
        }

        // HTTP adapter
        self.http_stop.cancel();
        let http = self.tasks.lock().http.take();
        if let Some(http) = http
            && let Err(e) = http.await
        {
            warn!(error = %e, "HTTP task ended abnormally");
        }

        *done = true;
        info!("Shutdown complete");
        flushed.and(closed)
    }

    /// Address the chat listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Address the HTTP adapter is bound to, if enabled.
    pub fn http_addr(&self) -> Option<SocketAddr> {
        self.http_addr
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn journal(&self) -> &Arc<Journal> {
        &self.journal
    }

    pub fn is_shutting_down(&self) -> bool {
        self.in_shutdown.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(dir: &TempDir, http: bool) -> Config {
        let journal = dir.path().join("chat.log");
        let mut text = format!(
            "[listen]\naddress = \"127.0.0.1:0\"\n\n[journal]\npath = {:?}\n",
            journal.display().to_string()
        );
        if http {
            text.push_str("\n[http]\naddress = \"127.0.0.1:0\"\n");
        }
        Config::parse(&text).unwrap()
    }

    #[tokio::test]
    async fn bind_picks_ephemeral_ports() {
        let dir = TempDir::new().unwrap();
        let server = Server::bind(&config(&dir, true)).await.unwrap();

        assert_ne!(server.local_addr().port(), 0);
        let http_addr = server.http_addr().unwrap();
        assert_ne!(http_addr.port(), 0);
        assert_ne!(http_addr, server.local_addr());
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn http_is_optional() {
        let dir = TempDir::new().unwrap();
        let server = Server::bind(&config(&dir, false)).await.unwrap();
        assert!(server.http_addr().is_none());
        server.start();
        server.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let server = Server::bind(&config(&dir, false)).await.unwrap();
        server.start();

        server.shutdown().await.unwrap();
        assert!(server.is_shutting_down());
        server.shutdown().await.unwrap();

        // Journal is closed once shutdown returns.
        assert!(matches!(
            server.journal().append("late").await,
            Err(JournalError::Closed)
        ));
    }

    #[tokio::test]
    async fn start_after_shutdown_does_nothing() {
        let dir = TempDir::new().unwrap();
        let server = Server::bind(&config(&dir, false)).await.unwrap();
        let addr = server.local_addr();
        server.shutdown().await.unwrap();
        server.start();

        assert!(tokio::net::TcpStream::connect(addr).await.is_err());
    }
}
