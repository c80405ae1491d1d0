//! Command transport seam and its TCP implementation.
//!
//! An iTach exposes its command service on TCP port 4998.  Each command is
//! one ASCII line terminated by `\r`, and each reply is one line terminated
//! the same way.
//!
//! The connection manager only talks to the [`DeviceConnector`] and
//! [`DeviceLink`] traits, so tests can substitute scripted devices for real
//! sockets.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Opens command links to devices.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self, address: SocketAddr) -> io::Result<Box<dyn DeviceLink>>;
}

/// An open, line-oriented command channel to one device.
#[async_trait]
pub trait DeviceLink: Send {
    /// Writes `line` exactly as given.  The caller supplies the terminator.
    async fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Reads the next non-empty reply line without its terminator.
    ///
    /// Returns `Ok(None)` when the device closed the connection.
    async fn read_line(&mut self) -> io::Result<Option<String>>;
}

/// Connects over TCP with a bounded connect time.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl DeviceConnector for TcpConnector {
    async fn connect(&self, address: SocketAddr) -> io::Result<Box<dyn DeviceLink>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(address))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {address} timed out"),
                )
            })??;
        stream.set_nodelay(true)?;
        debug!("command link open to {address}");
        Ok(Box::new(TcpLink::new(stream)))
    }
}

/// [`DeviceLink`] over a TCP stream.
pub struct TcpLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TcpLink {
    pub fn new(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: BufReader::new(read),
            writer: write,
        }
    }
}

#[async_trait]
impl DeviceLink for TcpLink {
    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await
    }

    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if self.reader.read_until(b'\r', &mut buf).await? == 0 {
                return Ok(None);
            }
            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_matches(|c: char| c == '\r' || c == '\n');
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
