//! Session - drives one client connection.
//!
//! ```text
//! Greeting ──▶ Naming ──▶ Active ──▶ Terminated
//!    │            │                      ▲
//!    └────────────┴──────────────────────┘
//! ```
//!
//! Greeting writes the welcome prompt. Naming reads names until one
//! registers. Active reads commands and chat until the peer leaves, a write
//! fails, or the server shuts down. Terminated always closes the connection
//! and unregisters the client if one was registered.

use crate::config::LimitsConfig;
use crate::error::{RegistryError, SessionError};
use crate::journal::RecordSink;
use crate::network::protocol::{self, Command};
use crate::state::{ConnectionHandle, META_ROOM, Registry};
use bytes::Bytes;
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

type LineReader<S> = FramedRead<ReadHalf<S>, LinesCodec>;

/// Per-connection limits.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub write_timeout: Duration,
    pub max_line_length: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&LimitsConfig::default())
    }
}

impl From<&LimitsConfig> for SessionSettings {
    fn from(limits: &LimitsConfig) -> Self {
        Self {
            write_timeout: limits.write_timeout(),
            max_line_length: limits.max_line_length,
        }
    }
}

/// Everything a session needs from the rest of the server.
#[derive(Clone)]
pub struct SessionShared {
    pub registry: Arc<Registry>,
    /// Receives one undecorated record per relayed chat message.
    pub journal: Arc<dyn RecordSink>,
    pub settings: SessionSettings,
    /// Help text, rendered once.
    pub help: Arc<str>,
    /// Cancelled when the server shuts down. Also passed to broadcasts.
    pub shutdown: CancellationToken,
}

impl SessionShared {
    pub fn new(
        registry: Arc<Registry>,
        journal: Arc<dyn RecordSink>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            journal,
            settings,
            help: Arc::from(protocol::help_text()),
            shutdown,
        }
    }
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionExit {
    /// The peer closed the stream.
    Disconnected,
    /// The server is shutting down.
    Shutdown,
    /// A read or write failed.
    Failed(SessionError),
}

/// Summary returned when a session ends.
#[derive(Debug)]
pub struct SessionReport {
    /// The registered name, if the session got that far.
    pub name: Option<String>,
    pub exit: SessionExit,
}

/// Outcome of waiting for the next line.
enum Inbound {
    Line(String),
    Eof,
    Shutdown,
}

/// A single client connection.
pub struct Session<S> {
    shared: SessionShared,
    stream: S,
    peer: String,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(shared: SessionShared, stream: S, peer: impl Into<String>) -> Self {
        Self {
            shared,
            stream,
            peer: peer.into(),
        }
    }

    /// Run the session to completion.
    #[instrument(skip(self), fields(peer = %self.peer), name = "session")]
    pub async fn run(self) -> SessionReport {
        let Self {
            shared,
            stream,
            peer,
        } = self;

        let (read_half, write_half) = tokio::io::split(stream);
        let conn = Arc::new(ConnectionHandle::new(peer, write_half));
        let mut lines = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(shared.settings.max_line_length),
        );
        let driver = Driver {
            shared: &shared,
            conn: &conn,
        };

        let mut name = None;
        let exit = driver.drive(&mut lines, &mut name).await;

        // Terminated
        if let Some(name) = &name {
            shared.registry.unregister(name);
        }
        conn.close().await;

        match &exit {
            SessionExit::Failed(e) => {
                info!(name = ?name, error = %e, code = e.error_code(), "Session ended with error")
            }
            SessionExit::Disconnected => info!(name = ?name, "Client disconnected"),
            SessionExit::Shutdown => debug!(name = ?name, "Session closed for shutdown"),
        }
        SessionReport { name, exit }
    }
}

struct Driver<'a> {
    shared: &'a SessionShared,
    conn: &'a Arc<ConnectionHandle>,
}

impl Driver<'_> {
    async fn drive<S>(&self, lines: &mut LineReader<S>, name: &mut Option<String>) -> SessionExit
    where
        S: AsyncRead + AsyncWrite,
    {
        // Greeting
        if let Err(e) = self.write(protocol::WELCOME.as_bytes()).await {
            return SessionExit::Failed(e);
        }

        // Naming
        let registered = match self.naming(lines).await {
            Ok(Ok(registered)) => registered,
            Ok(Err(exit)) => return exit,
            Err(e) => return SessionExit::Failed(e),
        };
        *name = Some(registered.clone());

        // Active
        match self.active(lines, &registered).await {
            Ok(exit) => exit,
            Err(e) => SessionExit::Failed(e),
        }
    }

    /// Read names until one registers. The inner `Err` carries a clean exit.
    async fn naming<S>(
        &self,
        lines: &mut LineReader<S>,
    ) -> Result<Result<String, SessionExit>, SessionError>
    where
        S: AsyncRead + AsyncWrite,
    {
        loop {
            let line = match self.next_line(lines).await? {
                Inbound::Line(line) => line,
                Inbound::Eof => return Ok(Err(SessionExit::Disconnected)),
                Inbound::Shutdown => return Ok(Err(SessionExit::Shutdown)),
            };

            let candidate = line.trim();
            if candidate.is_empty() {
                self.write(protocol::EMPTY_NAME.as_bytes()).await?;
                continue;
            }

            match self
                .shared
                .registry
                .register(candidate, Arc::clone(self.conn))
            {
                Ok(()) => return Ok(Ok(candidate.to_string())),
                Err(RegistryError::DuplicateClient(taken)) => {
                    debug!(name = %taken, "Name taken");
                    self.write(protocol::name_taken(&taken).as_bytes()).await?;
                }
                Err(RegistryError::MissingConnection(_)) => return Err(SessionError::Closed),
            }
        }
    }

    async fn active<S>(&self, lines: &mut LineReader<S>, name: &str) -> Result<SessionExit, SessionError>
    where
        S: AsyncRead + AsyncWrite,
    {
        let mut room = META_ROOM.to_string();
        self.show_help(name, &room).await?;

        loop {
            let line = match self.next_line(lines).await? {
                Inbound::Line(line) => line,
                Inbound::Eof => return Ok(SessionExit::Disconnected),
                Inbound::Shutdown => return Ok(SessionExit::Shutdown),
            };
            debug!(name = %name, line = %line, "Received line");

            let command = match protocol::parse(&line) {
                Ok(command) => command,
                Err(e) => {
                    debug!(name = %name, code = e.error_code(), "Rejected command");
                    self.write(protocol::command_error(e.line()).as_bytes())
                        .await?;
                    continue;
                }
            };

            match command {
                Command::Help => self.show_help(name, &room).await?,
                Command::Info => self.write(protocol::info_line(name, &room).as_bytes()).await?,
                Command::ChangeRoom(target) => {
                    self.shared.registry.change_room(name, &room, target);
                    room = target.to_string();
                    self.write(protocol::info_line(name, &room).as_bytes()).await?;
                }
                Command::Ignore(other) => {
                    self.shared.registry.set_ignore(name, other);
                }
                Command::Allow(other) => {
                    self.shared.registry.clear_ignore(name, other);
                }
                Command::Chat(text) => self.relay(name, &room, text).await,
            }
        }
    }

    /// Broadcast a chat message and journal it.
    async fn relay(&self, name: &str, room: &str, text: &str) {
        let payload = Bytes::from(protocol::chat_line(name, room, text));
        self.shared
            .registry
            .broadcast(&self.shared.shutdown, name, room, payload)
            .await;

        let record = Bytes::from(protocol::journal_record(name, room, text));
        if let Err(e) = self.shared.journal.append(record).await {
            warn!(name = %name, error = %e, code = e.error_code(), "Failed to journal message");
        }
    }

    async fn show_help(&self, name: &str, room: &str) -> Result<(), SessionError> {
        self.write(self.shared.help.as_bytes()).await?;
        self.write(protocol::info_line(name, room).as_bytes()).await
    }

    async fn next_line<S>(&self, lines: &mut LineReader<S>) -> Result<Inbound, SessionError>
    where
        S: AsyncRead + AsyncWrite,
    {
        tokio::select! {
            biased;
            _ = self.shared.shutdown.cancelled() => Ok(Inbound::Shutdown),
            frame = lines.next() => match frame {
                Some(Ok(line)) => Ok(Inbound::Line(line)),
                Some(Err(e)) => Err(e.into()),
                None => Ok(Inbound::Eof),
            },
        }
    }

    async fn write(&self, payload: &[u8]) -> Result<(), SessionError> {
        self.conn
            .send(payload, self.shared.settings.write_timeout)
            .await
    }
}
