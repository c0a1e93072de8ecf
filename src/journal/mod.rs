//! Durable message journal.
//!
//! An append-only file fronted by a write-behind buffer. Appends are queued
//! to a single background writer which batches them and writes the batch out
//! when the flush interval elapses, the buffer crosses the size threshold, or
//! a caller asks for an explicit flush.
//!
//! Snapshots read through a dedicated read-only descriptor and only see bytes
//! that have already been written out; records still sitting in the buffer
//! become visible at the next flush boundary.
//!
//! # Backpressure
//!
//! The record queue is bounded. When it is full, [`Journal::append`] waits,
//! which propagates a slow disk back to whoever is appending (including the
//! broadcaster), never to individual chat recipients.

mod writer;

use crate::config::JournalConfig;
use crate::error::JournalError;
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex as SyncMutex;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use writer::{BatchPolicy, JournalFiles, Request};

/// Write capability consumed by the registry for its audit trail.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Hand one pre-formatted record to the sink.
    async fn append(&self, record: Bytes) -> Result<(), JournalError>;
}

/// A sink that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl RecordSink for DiscardSink {
    async fn append(&self, _record: Bytes) -> Result<(), JournalError> {
        Ok(())
    }
}

/// Journal tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct JournalOptions {
    pub flush_interval: Duration,
    pub flush_threshold: usize,
    pub queue_capacity: usize,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(200),
            flush_threshold: 1024,
            queue_capacity: 100,
        }
    }
}

impl From<&JournalConfig> for JournalOptions {
    fn from(config: &JournalConfig) -> Self {
        Self {
            flush_interval: config.flush_interval(),
            flush_threshold: config.flush_threshold,
            queue_capacity: config.queue_capacity,
        }
    }
}

/// Handle to the durable message journal.
pub struct Journal {
    path: PathBuf,
    tx: mpsc::Sender<Request>,
    files: Arc<Mutex<JournalFiles>>,
    worker: SyncMutex<Option<JoinHandle<()>>>,
    /// Cancelled when the writer fails; durability is gone from then on.
    fatal: CancellationToken,
    failure: Arc<SyncMutex<Option<String>>>,
}

impl Journal {
    /// Open (or create) the journal file and start the background writer.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn open(path: impl AsRef<Path>, options: JournalOptions) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let writer = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let reader = OpenOptions::new().read(true).open(&path).await?;

        let files = Arc::new(Mutex::new(JournalFiles {
            writer: Some(writer),
            reader: Some(reader),
        }));
        let (tx, mut rx) = mpsc::channel(options.queue_capacity.max(1));
        let fatal = CancellationToken::new();
        let failure = Arc::new(SyncMutex::new(None));

        let policy = BatchPolicy {
            // tokio intervals must be non-zero.
            flush_interval: options.flush_interval.max(Duration::from_millis(1)),
            flush_threshold: options.flush_threshold.max(1),
        };
        let worker = {
            let files = Arc::clone(&files);
            let fatal = fatal.clone();
            let failure = Arc::clone(&failure);
            let path = path.clone();
            tokio::spawn(async move {
                if let Err(e) = writer::run(&mut rx, files, policy).await {
                    error!(
                        path = %path.display(),
                        error = %e,
                        code = e.error_code(),
                        "Journal writer failed, messages are no longer durable"
                    );
                    // Set before the queue closes; callers read it on send failure.
                    *failure.lock() = Some(e.to_string());
                    rx.close();
                    fatal.cancel();
                }
            })
        };

        info!(path = %path.display(), "Journal opened");
        Ok(Self {
            path,
            tx,
            files,
            worker: SyncMutex::new(Some(worker)),
            fatal,
            failure,
        })
    }

    /// Open a journal using settings from configuration.
    pub async fn from_config(config: &JournalConfig) -> Result<Self, JournalError> {
        Self::open(&config.path, JournalOptions::from(config)).await
    }

    /// Path of the journal file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queue a record for writing.
    ///
    /// Returns once the record is queued, not once it is on disk. Waits while
    /// the queue is full.
    pub async fn append(&self, record: impl Into<Bytes>) -> Result<(), JournalError> {
        self.tx
            .send(Request::Append(record.into()))
            .await
            .map_err(|_| self.unavailable())
    }

    /// Write every record queued so far to the file, waiting until done.
    pub async fn flush(&self) -> Result<(), JournalError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Request::Flush(ack_tx))
            .await
            .map_err(|_| self.unavailable())?;
        ack_rx.await.map_err(|_| self.unavailable())?
    }

    /// Read the full flushed content of the journal file.
    pub async fn snapshot(&self) -> Result<Bytes, JournalError> {
        let mut files = self.files.lock().await;
        let reader = files.reader.as_mut().ok_or(JournalError::Closed)?;
        reader.seek(SeekFrom::Start(0)).await?;
        let len = reader.metadata().await?.len();
        let len = usize::try_from(len)
            .map_err(|_| JournalError::Io(std::io::Error::other("journal exceeds address space")))?;
        let mut content = vec![0u8; len];
        reader.read_exact(&mut content).await?;
        Ok(Bytes::from(content))
    }

    /// Flush remaining records and release the file.
    ///
    /// Idempotent; later appends, flushes and snapshots fail with
    /// [`JournalError::Closed`].
    pub async fn close(&self) -> Result<(), JournalError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let result = match self.tx.send(Request::Close(ack_tx)).await {
            Ok(()) => ack_rx.await.unwrap_or(Ok(())),
            // Writer already gone: closed earlier or failed.
            Err(_) => match self.failure.lock().clone() {
                Some(reason) => Err(JournalError::WorkerFailed(reason)),
                None => Ok(()),
            },
        };

        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }
        if result.is_ok() {
            info!(path = %self.path.display(), "Journal closed");
        }
        result
    }

    /// Whether the background writer has failed.
    pub fn has_failed(&self) -> bool {
        self.fatal.is_cancelled()
    }

    /// Resolves when the background writer fails.
    pub async fn failed(&self) {
        self.fatal.cancelled().await;
    }

    fn unavailable(&self) -> JournalError {
        match self.failure.lock().clone() {
            Some(reason) => JournalError::WorkerFailed(reason),
            None => JournalError::Closed,
        }
    }
}

#[async_trait]
impl RecordSink for Journal {
    async fn append(&self, record: Bytes) -> Result<(), JournalError> {
        Journal::append(self, record).await
    }
}
