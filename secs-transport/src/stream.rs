//! Stream accessor trait for transport layer

use crate::error::{SecsError, SecsResult};
use async_trait::async_trait;
use std::time::Duration;

/// Stream accessor interface to a physical byte stream (socket or serial line)
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the read timeout
    ///
    /// # Arguments
    ///
    /// * `timeout` - The timeout duration. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecsResult<()>;

    /// Read data from the stream
    ///
    /// # Returns
    ///
    /// Number of bytes read, or 0 if EOF
    async fn read(&mut self, buf: &mut [u8]) -> SecsResult<usize>;

    /// Read exact number of bytes from the stream
    async fn read_exact(&mut self, mut buf: &mut [u8]) -> SecsResult<()> {
        while !buf.is_empty() {
            let n = self.read(buf).await?;
            if n == 0 {
                return Err(SecsError::io(
                    std::io::ErrorKind::UnexpectedEof,
                    "Failed to read exact number of bytes",
                ));
            }
            buf = &mut buf[n..];
        }
        Ok(())
    }

    /// Read a single byte, waiting at most `timeout`
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the timeout elapsed with nothing received,
    /// `ConnectionLost` on EOF.
    async fn read_byte(&mut self, timeout: Option<Duration>) -> SecsResult<Option<u8>> {
        let mut buf = [0u8; 1];
        let n = match timeout {
            Some(t) => match tokio::time::timeout(t, self.read(&mut buf)).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            },
            None => self.read(&mut buf).await?,
        };
        if n == 0 {
            return Err(SecsError::ConnectionLost);
        }
        Ok(Some(buf[0]))
    }

    /// Write data to the stream
    ///
    /// # Returns
    ///
    /// Number of bytes written
    async fn write(&mut self, buf: &[u8]) -> SecsResult<usize>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> SecsResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(SecsError::io(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                ));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> SecsResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream
    async fn close(&mut self) -> SecsResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> SecsResult<()>;
}
