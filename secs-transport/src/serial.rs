//! Serial port transport implementation (SECS-I over RS-232)

use crate::error::{SecsError, SecsResult};
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::SerialStream;

/// Serial port transport layer settings
///
/// SECS-I lines are 8 data bits, 1 stop bit, no parity.
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    /// Create new serial settings with SECS-I line parameters
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
            timeout: None,
        }
    }
}

/// Serial port transport layer implementation
pub struct SerialTransport {
    stream: Option<SerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl fmt::Debug for SerialTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialTransport")
            .field("settings", &self.settings)
            .field("closed", &self.closed)
            .finish()
    }
}

fn not_connected() -> SecsError {
    SecsError::io(ErrorKind::NotConnected, "Serial port not open")
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            closed: true,
        }
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> SecsResult<()> {
        if !self.closed {
            return Err(SecsError::io(
                ErrorKind::InvalidInput,
                "Serial port has already been opened",
            ));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            SecsError::io(
                ErrorKind::Other,
                format!("Failed to open serial port {}: {}", self.settings.port_name, e),
            )
        })?;

        log::debug!(
            "Serial port {} opened at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.stream = Some(stream);
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> SecsResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> SecsResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;

        let result = match self.settings.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, stream.read(buf)).await {
                Ok(r) => r.map_err(SecsError::Connection),
                Err(_) => return Err(SecsError::io(ErrorKind::TimedOut, "Serial read timed out")),
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
            let _ = stream.flush().await;
        }
        self.closed = true;
        Ok(())
    }
}
