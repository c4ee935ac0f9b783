//! TCP transport implementation

use crate::error::{SecsError, SecsResult};
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// TCP transport layer settings
#[derive(Debug, Clone)]
pub struct TcpSettings {
    /// `host:port`, resolved on open
    pub address: String,
    /// Bound on connection establishment
    pub connect_timeout: Option<Duration>,
    /// Read timeout; None waits forever
    pub timeout: Option<Duration>,
}

impl TcpSettings {
    /// Create new TCP settings
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: None,
            timeout: None,
        }
    }

    /// Create TCP settings with a connect timeout
    pub fn with_connect_timeout(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Some(timeout),
            timeout: None,
        }
    }
}

/// TCP transport layer implementation
pub struct TcpTransport {
    stream: Option<TcpStream>,
    settings: TcpSettings,
    peer: Option<SocketAddr>,
    closed: bool,
}

impl fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpTransport")
            .field("settings", &self.settings)
            .field("peer", &self.peer)
            .field("closed", &self.closed)
            .finish()
    }
}

fn not_connected() -> SecsError {
    SecsError::io(ErrorKind::NotConnected, "TCP stream not connected")
}

impl TcpTransport {
    /// Create a new TCP transport layer
    pub fn new(settings: TcpSettings) -> Self {
        Self {
            stream: None,
            settings,
            peer: None,
            closed: true,
        }
    }

    /// Create TCP transport from an address string
    pub fn from_address(address: &str) -> Self {
        Self::new(TcpSettings::new(address))
    }

    /// Create TCP transport from an already-connected TcpStream (for passive use)
    pub fn from_connected_stream(stream: TcpStream, timeout: Option<Duration>) -> Self {
        let peer = stream.peer_addr().ok();
        let _ = stream.set_nodelay(true);
        Self {
            settings: TcpSettings {
                address: peer.map(|p| p.to_string()).unwrap_or_default(),
                connect_timeout: None,
                timeout,
            },
            stream: Some(stream),
            peer,
            closed: false,
        }
    }

    /// Address of the connected peer
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Give up the socket, e.g. to split it into read and write halves
    pub fn into_stream(mut self) -> Option<TcpStream> {
        self.closed = true;
        self.stream.take()
    }
}

#[async_trait]
impl TransportLayer for TcpTransport {
    async fn open(&mut self) -> SecsResult<()> {
        if !self.closed {
            return Err(SecsError::io(
                ErrorKind::InvalidInput,
                "Connection has already been opened",
            ));
        }

        let connect = TcpStream::connect(self.settings.address.as_str());
        let stream = match self.settings.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, connect)
                .await
                .map_err(|_| {
                    SecsError::io(
                        ErrorKind::TimedOut,
                        format!("Connecting to {} timed out", self.settings.address),
                    )
                })??,
            None => connect.await?,
        };
        let _ = stream.set_nodelay(true);

        self.peer = stream.peer_addr().ok();
        self.stream = Some(stream);
        self.closed = false;
        log::debug!("TCP connected to {}", self.settings.address);
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for TcpTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecsResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> SecsResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let result = match self.settings.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, stream.read(buf)).await {
                Ok(r) => r.map_err(SecsError::Connection),
                Err(_) => return Err(SecsError::io(ErrorKind::TimedOut, "TCP read timed out")),
            },
            None => stream.read(buf).await.map_err(SecsError::Connection),
        };

        match result {
            Ok(0) => {
                self.closed = true;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                self.closed = true;
                Err(e)
            }
        }
    }

    async fn write(&mut self, buf: &[u8]) -> SecsResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write(buf).await.map_err(SecsError::Connection)
    }

    async fn flush(&mut self) -> SecsResult<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.flush().await.map_err(SecsError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> SecsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.shutdown().await;
        }
        self.closed = true;
        Ok(())
    }
}
