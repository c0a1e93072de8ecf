//! Test server management.
//!
//! Runs a telchat server inside the test runtime on ephemeral ports, with
//! its journal in a temporary directory.

use std::net::SocketAddr;
use std::path::PathBuf;
use telchat::Server;
use telchat::config::Config;
use tempfile::TempDir;

/// A test server instance.
pub struct TestServer {
    server: Server,
    _data_dir: TempDir,
    journal_path: PathBuf,
}

impl TestServer {
    /// Start a server with the HTTP adapter enabled.
    pub async fn spawn() -> anyhow::Result<Self> {
        let data_dir = TempDir::new()?;
        let journal_path = data_dir.path().join("chat.log");

        let config_content = format!(
            r#"
[server]
name = "test.server"

[listen]
address = "127.0.0.1:0"

[http]
address = "127.0.0.1:0"

[journal]
path = "{}"
flush_interval_ms = 50

[limits]
write_timeout_secs = 2
max_line_length = 1024
"#,
            journal_path.display()
        );
        let config = Config::parse(&config_content)?;

        let server = Server::bind(&config).await?;
        server.start();

        Ok(Self {
            server,
            _data_dir: data_dir,
            journal_path,
        })
    }

    /// Chat listener address.
    pub fn address(&self) -> SocketAddr {
        self.server.local_addr()
    }

    /// Base URL of the HTTP adapter.
    #[allow(dead_code)]
    pub fn http_url(&self, path: &str) -> String {
        let addr = self
            .server
            .http_addr()
            .expect("test server always enables http");
        format!("http://{addr}{path}")
    }

    /// Path of the journal file on disk.
    #[allow(dead_code)]
    pub fn journal_path(&self) -> &PathBuf {
        &self.journal_path
    }

    #[allow(dead_code)]
    pub fn server(&self) -> &Server {
        &self.server
    }

    /// Connect a client and complete the naming phase.
    pub async fn connect(&self, name: &str) -> anyhow::Result<super::client::TestClient> {
        let mut client = super::client::TestClient::connect(self.address(), name).await?;
        client.register().await?;
        Ok(client)
    }
}
