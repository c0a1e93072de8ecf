//! Test chat client.
//!
//! Sends lines and asserts on the raw text the server writes back. Server
//! output is not strictly line-based (prompts end in `>>`), so everything
//! received is kept in one buffer and matched by substring.

use std::net::SocketAddr;
use std::time::Duration;
use telchat::network::protocol;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::{Instant, timeout, timeout_at};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A test chat client.
pub struct TestClient {
    reader: OwnedReadHalf,
    writer: BufWriter<OwnedWriteHalf>,
    name: String,
    pending: String,
}

impl TestClient {
    /// Connect to a test server.
    pub async fn connect(address: SocketAddr, name: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (reader, write_half) = stream.into_split();

        Ok(Self {
            reader,
            writer: BufWriter::new(write_half),
            name: name.to_string(),
            pending: String::new(),
        })
    }

    #[allow(dead_code)]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Send one line.
    pub async fn send(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Read until `needle` shows up and return everything up to and
    /// including it.
    pub async fn expect(&mut self, needle: &str) -> anyhow::Result<String> {
        let (_, taken) = self.expect_any(&[needle]).await?;
        Ok(taken)
    }

    /// Read until any of `needles` shows up. Returns the index of the first
    /// match in the received text and everything up to and including it.
    pub async fn expect_any(&mut self, needles: &[&str]) -> anyhow::Result<(usize, String)> {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            let found = needles
                .iter()
                .enumerate()
                .filter_map(|(idx, needle)| {
                    self.pending.find(needle).map(|pos| (pos, idx, needle.len()))
                })
                .min();
            if let Some((pos, idx, len)) = found {
                return Ok((idx, self.pending.drain(..pos + len).collect()));
            }
            let mut buf = [0u8; 4096];
            let read = match timeout_at(deadline, self.reader.read(&mut buf)).await {
                Ok(read) => read?,
                Err(_) => anyhow::bail!("timed out waiting for {needles:?}, got {:?}", self.pending),
            };
            if read == 0 {
                anyhow::bail!("connection closed waiting for {needles:?}, got {:?}", self.pending);
            }
            self.pending.push_str(&String::from_utf8_lossy(&buf[..read]));
        }
    }

    /// Fail if anything arrives within `window`.
    #[allow(dead_code)]
    pub async fn expect_silence(&mut self, window: Duration) -> anyhow::Result<()> {
        if !self.pending.is_empty() {
            anyhow::bail!("unexpected buffered output: {:?}", self.pending);
        }
        let mut buf = [0u8; 4096];
        match timeout(window, self.reader.read(&mut buf)).await {
            Err(_) => Ok(()),
            Ok(Ok(0)) => anyhow::bail!("connection closed"),
            Ok(Ok(n)) => anyhow::bail!("unexpected output: {:?}", String::from_utf8_lossy(&buf[..n])),
            Ok(Err(e)) => Err(e.into()),
        }
    }

    /// Wait for the server to close the connection, discarding output.
    #[allow(dead_code)]
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        let mut buf = [0u8; 4096];
        loop {
            match timeout_at(deadline, self.reader.read(&mut buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) => return Ok(()),
                Ok(Ok(_)) => continue,
                Err(_) => anyhow::bail!("connection was never closed"),
            }
        }
    }

    /// Answer the welcome prompt with this client's name and wait for the
    /// help banner.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        self.expect(protocol::WELCOME).await?;
        let name = self.name.clone();
        self.send(&name).await?;
        self.expect(&protocol::info_line(&name, "default")).await?;
        Ok(())
    }

    /// Switch rooms and wait for the confirmation.
    #[allow(dead_code)]
    pub async fn change_room(&mut self, room: &str) -> anyhow::Result<()> {
        self.send(&format!("/room change {room}")).await?;
        let name = self.name.clone();
        self.expect(&protocol::info_line(&name, room)).await?;
        Ok(())
    }
}
