//! Background batch writer for the journal.
//!
//! A single task owns the in-memory buffer. Records arrive on a bounded
//! channel together with flush and close requests, so a flush always covers
//! every record appended before it.

use crate::error::JournalError;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Acknowledgement channel for flush and close requests.
pub(super) type Ack = oneshot::Sender<Result<(), JournalError>>;

/// Work item for the writer task.
pub(super) enum Request {
    Append(Bytes),
    Flush(Ack),
    Close(Ack),
}

/// The two descriptors on the journal file.
///
/// Both sit behind one lock so a snapshot never observes a half-written batch.
pub(super) struct JournalFiles {
    pub writer: Option<File>,
    pub reader: Option<File>,
}

/// Batching parameters for the writer task.
#[derive(Debug, Clone, Copy)]
pub(super) struct BatchPolicy {
    pub flush_interval: Duration,
    pub flush_threshold: usize,
}

/// Run the writer loop until the journal is closed or every handle is dropped.
///
/// Returns an error only for a failed file write; the caller treats that as
/// fatal for the process.
pub(super) async fn run(
    rx: &mut mpsc::Receiver<Request>,
    files: Arc<Mutex<JournalFiles>>,
    policy: BatchPolicy,
) -> Result<(), JournalError> {
    let mut buffer = BytesMut::with_capacity(policy.flush_threshold);
    let mut ticker = tokio::time::interval(policy.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    trace!(bytes = buffer.len(), "Timer flush");
                    write_out(&files, &mut buffer).await?;
                }
            }
            request = rx.recv() => match request {
                Some(Request::Append(record)) => {
                    buffer.extend_from_slice(&record);
                    if buffer.len() >= policy.flush_threshold {
                        trace!(bytes = buffer.len(), "Threshold flush");
                        write_out(&files, &mut buffer).await?;
                    }
                }
                Some(Request::Flush(ack)) => {
                    if let Err(e) = write_out(&files, &mut buffer).await {
                        let _ = ack.send(Err(JournalError::WorkerFailed(e.to_string())));
                        return Err(e);
                    }
                    let _ = ack.send(Ok(()));
                }
                Some(Request::Close(ack)) => {
                    rx.close();
                    let result = drain_and_close(rx, &files, &mut buffer).await;
                    match result {
                        Ok(()) => {
                            let _ = ack.send(Ok(()));
                            debug!("Journal writer closed");
                            return Ok(());
                        }
                        Err(e) => {
                            let _ = ack.send(Err(JournalError::WorkerFailed(e.to_string())));
                            return Err(e);
                        }
                    }
                }
                None => {
                    // Every handle is gone; persist what is left.
                    return drain_and_close(rx, &files, &mut buffer).await;
                }
            }
        }
    }
}

/// Write whatever is buffered to the file and clear the buffer.
async fn write_out(
    files: &Mutex<JournalFiles>,
    buffer: &mut BytesMut,
) -> Result<(), JournalError> {
    if buffer.is_empty() {
        return Ok(());
    }
    let mut files = files.lock().await;
    let writer = files.writer.as_mut().ok_or(JournalError::Closed)?;
    writer.write_all(buffer).await?;
    // tokio's File completes the write in the background until flushed.
    writer.flush().await?;
    buffer.clear();
    Ok(())
}

/// Absorb records still queued behind a close, write them, and release both
/// descriptors.
async fn drain_and_close(
    rx: &mut mpsc::Receiver<Request>,
    files: &Mutex<JournalFiles>,
    buffer: &mut BytesMut,
) -> Result<(), JournalError> {
    let mut acks = Vec::new();
    while let Ok(request) = rx.try_recv() {
        match request {
            Request::Append(record) => buffer.extend_from_slice(&record),
            Request::Flush(ack) | Request::Close(ack) => acks.push(ack),
        }
    }

    let result = release(files, buffer).await;
    for ack in acks {
        let _ = ack.send(match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(JournalError::WorkerFailed(e.to_string())),
        });
    }
    result
}

async fn release(files: &Mutex<JournalFiles>, buffer: &mut BytesMut) -> Result<(), JournalError> {
    write_out(files, buffer).await?;

    let mut files = files.lock().await;
    if let Some(mut writer) = files.writer.take() {
        writer.sync_all().await?;
    }
    files.reader = None;
    Ok(())
}
