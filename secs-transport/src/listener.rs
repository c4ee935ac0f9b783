//! TCP acceptor for the passive connection role

use crate::error::{SecsError, SecsResult};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

/// Bound TCP listener
///
/// Dropping the acceptor closes the listening socket, which is how the
/// passive rebind loop releases the port between sessions.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpAcceptor {
    /// Bind to `address` (`host:port`)
    ///
    /// # Errors
    /// Returns error if binding to the address fails
    pub async fn bind(address: &str) -> SecsResult<Self> {
        let listener = TcpListener::bind(address).await.map_err(|e| {
            SecsError::io(
                e.kind(),
                format!("Failed to bind to {}: {}", address, e),
            )
        })?;
        let local_addr = listener.local_addr()?;
        log::debug!("Listening on {}", local_addr);
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Wait for the next inbound connection
    pub async fn accept(&self) -> SecsResult<(TcpStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().await?;
        let _ = stream.set_nodelay(true);
        Ok((stream, peer))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}
