//! Communication channel — the transport that yields one connected byte
//! stream per session.
//!
//! The bridge side is always the listener; the daemon connects as the
//! client using the connection identifier it was handed on its command
//! line. That identifier ([`CommunicationChannel::endpoint`]) must be
//! available *before* the daemon process is spawned, which is why both
//! implementations bind at construction time.
//!
//! A channel is single-use: it produces exactly one stream and is spent
//! afterwards.

use std::future::Future;
use std::io;
#[cfg(unix)]
use std::path::PathBuf;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
#[cfg(unix)]
use uuid::Uuid;

/// Duplex byte stream to the connected daemon.
pub type ByteStream = Box<dyn RawStream>;

/// Object-safe bundle of the stream traits the dispatcher needs.
pub trait RawStream: AsyncRead + AsyncWrite + Send + Unpin + std::fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin + std::fmt::Debug> RawStream for T {}

/// A transport endpoint the daemon can connect back to.
pub trait CommunicationChannel: Send + 'static {
    /// The connection identifier the daemon is started with — a decimal
    /// port number for TCP, a pipe path otherwise.
    fn endpoint(&self) -> String;

    /// Wait until exactly one peer connects, yielding the duplex stream.
    ///
    /// Single use: a channel that has already produced its stream fails on
    /// any further call.
    fn establish(&mut self) -> impl Future<Output = io::Result<ByteStream>> + Send;
}

fn spent() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "channel already established")
}

/// Loopback TCP listener variant.
pub struct TcpChannel {
    listener: Option<TcpListener>,
    port: u16,
}

impl TcpChannel {
    /// Bind a listener on `127.0.0.1`. Port 0 selects a free port; the
    /// port reported by [`CommunicationChannel::endpoint`] is the bound
    /// one either way.
    pub async fn bind(port: u16) -> io::Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let port = listener.local_addr()?.port();
        Ok(Self {
            listener: Some(listener),
            port,
        })
    }
}

impl CommunicationChannel for TcpChannel {
    fn endpoint(&self) -> String {
        self.port.to_string()
    }

    async fn establish(&mut self) -> io::Result<ByteStream> {
        let listener = self.listener.take().ok_or_else(spent)?;
        let (stream, peer) = listener.accept().await?;
        tracing::debug!(%peer, "analyzer daemon connected over tcp");
        Ok(Box::new(stream))
    }
}

/// Named-pipe variant, realized as a Unix domain socket whose filename
/// embeds a freshly generated identifier.
#[cfg(unix)]
pub struct PipeChannel {
    listener: Option<UnixListener>,
    path: PathBuf,
}

#[cfg(unix)]
impl PipeChannel {
    /// Bind a uniquely named socket under `dir` (system temp directory by
    /// default). The embedded UUID keeps concurrent sessions from
    /// colliding.
    pub fn bind(dir: Option<PathBuf>) -> io::Result<Self> {
        let dir = dir.unwrap_or_else(std::env::temp_dir);
        let path = dir.join(format!("cppd-bridge-{}.sock", Uuid::new_v4()));
        let listener = UnixListener::bind(&path)?;
        Ok(Self {
            listener: Some(listener),
            path,
        })
    }
}

#[cfg(unix)]
impl CommunicationChannel for PipeChannel {
    fn endpoint(&self) -> String {
        self.path.display().to_string()
    }

    async fn establish(&mut self) -> io::Result<ByteStream> {
        let listener = self.listener.take().ok_or_else(spent)?;
        let (stream, _) = listener.accept().await?;
        tracing::debug!(path = %self.path.display(), "analyzer daemon connected over pipe");
        Ok(Box::new(stream))
    }
}

#[cfg(unix)]
impl Drop for PipeChannel {
    fn drop(&mut self) {
        // The socket file outlives the listener; unlinking after the one
        // connection is accepted does not disturb that connection.
        let _ = std::fs::remove_file(&self.path);
    }
}
