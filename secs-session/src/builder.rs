//! Communicator builder for SECS/GEM sessions
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use secs_session::CommunicatorBuilder;
//! use std::time::Duration;
//!
//! # fn demo() -> secs_session::SecsResult<()> {
//! // HSMS equipment listening on port 5000
//! let equip = CommunicatorBuilder::new()
//!     .tcp("0.0.0.0:5000")
//!     .device_id(10)
//!     .equipment(true)
//!     .name("equip")
//!     .build_hsms_passive()?;
//!
//! // SECS-I host on a serial line
//! let host = CommunicatorBuilder::new()
//!     .serial("/dev/ttyUSB0", 9600)
//!     .t3(Duration::from_secs(30))
//!     .build_secs1_serial()?;
//! # Ok(())
//! # }
//! ```

use crate::config::{
    CommunicatorConfig, ConnectionMode, HsmsConfig, Secs1Config, Secs1Port, Timeouts,
};
use crate::error::{SecsError, SecsResult};
use crate::hsms::HsmsCommunicator;
use crate::secs1::Secs1Communicator;
use std::time::Duration;

/// Builder for HSMS and SECS-I communicators
///
/// # Configuration Flow
/// 1. Create builder with `CommunicatorBuilder::new()`
/// 2. Configure the link (`tcp` or `serial`)
/// 3. Configure identity and timers
/// 4. Build with one of the `build_*` methods
#[derive(Debug, Clone)]
pub struct CommunicatorBuilder {
    link: Link,
    name: Option<String>,
    device_id: u16,
    is_equip: bool,
    timeouts: Timeouts,
    retry: u32,
    max_message_size: usize,
    event_capacity: usize,
}

#[derive(Debug, Clone)]
enum Link {
    Tcp { address: String },
    Serial { path: String, baud_rate: u32 },
    None,
}

impl CommunicatorBuilder {
    /// Create a builder with SEMI default timers, device id 0, host role
    pub fn new() -> Self {
        let defaults = CommunicatorConfig::default();
        Self {
            link: Link::None,
            name: None,
            device_id: defaults.device_id,
            is_equip: defaults.is_equip,
            timeouts: defaults.timeouts,
            retry: defaults.retry,
            max_message_size: defaults.max_message_size,
            event_capacity: defaults.event_capacity,
        }
    }

    /// Start from an existing configuration
    pub fn from_config(config: CommunicatorConfig) -> Self {
        Self {
            link: Link::None,
            name: Some(config.name),
            device_id: config.device_id,
            is_equip: config.is_equip,
            timeouts: config.timeouts,
            retry: config.retry,
            max_message_size: config.max_message_size,
            event_capacity: config.event_capacity,
        }
    }

    /// TCP address, `host:port`; dialed when Active, bound when Passive
    pub fn tcp(mut self, address: &str) -> Self {
        self.link = Link::Tcp {
            address: address.to_string(),
        };
        self
    }

    /// Serial port (e.g. "/dev/ttyUSB0" or "COM1") for SECS-I
    pub fn serial(mut self, path: &str, baud_rate: u32) -> Self {
        self.link = Link::Serial {
            path: path.to_string(),
            baud_rate,
        };
        self
    }

    /// Session id (HSMS) or device id (SECS-I)
    pub fn device_id(mut self, device_id: u16) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn equipment(mut self, is_equip: bool) -> Self {
        self.is_equip = is_equip;
        self
    }

    /// Tag used in log lines; defaults to "equip" or "host"
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn t2(mut self, timeout: Duration) -> Self {
        self.timeouts.t2 = timeout;
        self
    }

    pub fn t3(mut self, timeout: Duration) -> Self {
        self.timeouts.t3 = timeout;
        self
    }

    pub fn t4(mut self, timeout: Duration) -> Self {
        self.timeouts.t4 = timeout;
        self
    }

    pub fn t5(mut self, timeout: Duration) -> Self {
        self.timeouts.t5 = timeout;
        self
    }

    pub fn t6(mut self, timeout: Duration) -> Self {
        self.timeouts.t6 = timeout;
        self
    }

    pub fn t7(mut self, timeout: Duration) -> Self {
        self.timeouts.t7 = timeout;
        self
    }

    pub fn t8(mut self, timeout: Duration) -> Self {
        self.timeouts.t8 = timeout;
        self
    }

    /// Delay before a passive listener binds again
    pub fn rebind(mut self, delay: Duration) -> Self {
        self.timeouts.rebind = delay;
        self
    }

    /// SECS-I block retries after the first attempt
    pub fn retry(mut self, retry: u32) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Shared settings this builder would produce
    pub fn common(&self) -> CommunicatorConfig {
        let default_name = if self.is_equip { "equip" } else { "host" };
        let name = self
            .name
            .clone()
            .unwrap_or_else(|| default_name.to_string());
        CommunicatorConfig {
            name,
            device_id: self.device_id,
            is_equip: self.is_equip,
            timeouts: self.timeouts,
            retry: self.retry,
            max_message_size: self.max_message_size,
            event_capacity: self.event_capacity,
        }
    }

    fn tcp_address(&self) -> SecsResult<String> {
        match &self.link {
            Link::Tcp { address } => Ok(address.clone()),
            _ => Err(SecsError::Config(
                "TCP address must be configured".to_string(),
            )),
        }
    }

    fn hsms(self, mode: ConnectionMode) -> SecsResult<HsmsCommunicator> {
        let config = HsmsConfig {
            address: self.tcp_address()?,
            mode,
            common: self.common(),
        };
        HsmsCommunicator::new(config)
    }

    fn secs1(self, port: Secs1Port) -> SecsResult<Secs1Communicator> {
        Secs1Communicator::new(Secs1Config {
            port,
            common: self.common(),
        })
    }

    /// HSMS Active: dials and selects on `open()`
    pub fn build_hsms_active(self) -> SecsResult<HsmsCommunicator> {
        self.hsms(ConnectionMode::Active)
    }

    /// HSMS Passive: listens on `open()`
    pub fn build_hsms_passive(self) -> SecsResult<HsmsCommunicator> {
        self.hsms(ConnectionMode::Passive)
    }

    /// SECS-I on the configured serial port
    pub fn build_secs1_serial(self) -> SecsResult<Secs1Communicator> {
        let port = match &self.link {
            Link::Serial { path, baud_rate } => Secs1Port::Serial {
                path: path.clone(),
                baud_rate: *baud_rate,
            },
            _ => {
                return Err(SecsError::Config(
                    "serial port must be configured".to_string(),
                ));
            }
        };
        self.secs1(port)
    }

    /// SECS-I on TCP/IP, dialing the peer
    pub fn build_secs1_tcp_active(self) -> SecsResult<Secs1Communicator> {
        let address = self.tcp_address()?;
        self.secs1(Secs1Port::TcpActive { address })
    }

    /// SECS-I on TCP/IP, accepting one peer at a time
    pub fn build_secs1_tcp_passive(self) -> SecsResult<Secs1Communicator> {
        let address = self.tcp_address()?;
        self.secs1(Secs1Port::TcpPassive { address })
    }
}

impl Default for CommunicatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
