//! Communicator configuration

use crate::error::{SecsError, SecsResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Protocol timer values
///
/// Defaults follow SEMI E4/E37: T2 10 s, T3 45 s, T4 45 s, T5 10 s,
/// T6 5 s, T7 10 s, T8 5 s, rebind 5 s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// SECS-I protocol timeout
    pub t2: Duration,
    /// Reply timeout
    pub t3: Duration,
    /// SECS-I inter-block timeout
    pub t4: Duration,
    /// Connect separation timeout
    pub t5: Duration,
    /// Control transaction timeout
    pub t6: Duration,
    /// Not-selected timeout
    pub t7: Duration,
    /// Inter-character timeout
    pub t8: Duration,
    /// Delay before a passive listener binds again
    pub rebind: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            t2: Duration::from_secs(10),
            t3: Duration::from_secs(45),
            t4: Duration::from_secs(45),
            t5: Duration::from_secs(10),
            t6: Duration::from_secs(5),
            t7: Duration::from_secs(10),
            t8: Duration::from_secs(5),
            rebind: Duration::from_secs(5),
        }
    }
}

/// Settings shared by every communicator
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// Tag written into every log line
    pub name: String,
    /// Session id (HSMS) or device id (SECS-I), 0..=0x7FFF
    pub device_id: u16,
    /// True when this side is the equipment
    pub is_equip: bool,
    pub timeouts: Timeouts,
    /// SECS-I block retries after the first attempt
    pub retry: u32,
    /// Largest accepted message body in bytes
    pub max_message_size: usize,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            name: "secs".to_string(),
            device_id: 0,
            is_equip: false,
            timeouts: Timeouts::default(),
            retry: 3,
            max_message_size: 16 * 1024 * 1024,
            event_capacity: 256,
        }
    }
}

impl CommunicatorConfig {
    pub fn validate(&self) -> SecsResult<()> {
        if self.device_id > 0x7FFF {
            return Err(SecsError::Config(format!(
                "device id {} out of range 0..=32767",
                self.device_id
            )));
        }
        if self.event_capacity == 0 {
            return Err(SecsError::Config("event capacity must be positive".to_string()));
        }
        Ok(())
    }
}

/// HSMS connection role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionMode {
    /// Dials the peer and initiates Select
    Active,
    /// Listens and accepts one session at a time
    Passive,
}

/// HSMS communicator configuration
#[derive(Debug, Clone)]
pub struct HsmsConfig {
    /// `host:port` to dial (Active) or bind (Passive)
    pub address: String,
    pub mode: ConnectionMode,
    pub common: CommunicatorConfig,
}

/// Physical link of a SECS-I communicator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Secs1Port {
    Serial { path: String, baud_rate: u32 },
    TcpActive { address: String },
    TcpPassive { address: String },
}

/// SECS-I communicator configuration
#[derive(Debug, Clone)]
pub struct Secs1Config {
    pub port: Secs1Port,
    pub common: CommunicatorConfig,
}

/// Flat settings record with timeouts in seconds
///
/// Accepts the camelCase keys used by existing deployments:
///
/// ```json
/// { "ip": "127.0.0.1", "port": 5000, "deviceId": 10, "isEquip": true,
///   "timeoutT3": 45, "timeoutRebind": 5 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommunicatorSettings {
    pub name: Option<String>,
    pub ip: String,
    pub port: u16,
    pub device_id: u16,
    pub is_equip: bool,
    pub timeout_t2: f64,
    pub timeout_t3: f64,
    pub timeout_t4: f64,
    pub timeout_t5: f64,
    pub timeout_t6: f64,
    pub timeout_t7: f64,
    pub timeout_t8: f64,
    pub timeout_rebind: f64,
    pub retry: u32,
    pub path: Option<String>,
    pub baud_rate: u32,
}

impl Default for CommunicatorSettings {
    fn default() -> Self {
        let t = Timeouts::default();
        Self {
            name: None,
            ip: "127.0.0.1".to_string(),
            port: 5000,
            device_id: 0,
            is_equip: false,
            timeout_t2: t.t2.as_secs_f64(),
            timeout_t3: t.t3.as_secs_f64(),
            timeout_t4: t.t4.as_secs_f64(),
            timeout_t5: t.t5.as_secs_f64(),
            timeout_t6: t.t6.as_secs_f64(),
            timeout_t7: t.t7.as_secs_f64(),
            timeout_t8: t.t8.as_secs_f64(),
            timeout_rebind: t.rebind.as_secs_f64(),
            retry: 3,
            path: None,
            baud_rate: 9600,
        }
    }
}

fn seconds(name: &str, value: f64) -> SecsResult<Duration> {
    Duration::try_from_secs_f64(value)
        .ok()
        .filter(|d| !d.is_zero())
        .ok_or_else(|| SecsError::Config(format!("{} must be a positive number of seconds, got {}", name, value)))
}

impl CommunicatorSettings {
    /// Parse settings from JSON
    pub fn from_json(text: &str) -> SecsResult<Self> {
        serde_json::from_str(text).map_err(|e| SecsError::Config(e.to_string()))
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    pub fn timeouts(&self) -> SecsResult<Timeouts> {
        Ok(Timeouts {
            t2: seconds("timeoutT2", self.timeout_t2)?,
            t3: seconds("timeoutT3", self.timeout_t3)?,
            t4: seconds("timeoutT4", self.timeout_t4)?,
            t5: seconds("timeoutT5", self.timeout_t5)?,
            t6: seconds("timeoutT6", self.timeout_t6)?,
            t7: seconds("timeoutT7", self.timeout_t7)?,
            t8: seconds("timeoutT8", self.timeout_t8)?,
            rebind: seconds("timeoutRebind", self.timeout_rebind)?,
        })
    }

    pub fn common(&self) -> SecsResult<CommunicatorConfig> {
        let default_name = if self.is_equip { "equip" } else { "host" };
        let config = CommunicatorConfig {
            name: self
                .name
                .clone()
                .unwrap_or_else(|| default_name.to_string()),
            device_id: self.device_id,
            is_equip: self.is_equip,
            timeouts: self.timeouts()?,
            retry: self.retry,
            ..CommunicatorConfig::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn into_hsms(self, mode: ConnectionMode) -> SecsResult<HsmsConfig> {
        Ok(HsmsConfig {
            common: self.common()?,
            address: self.address(),
            mode,
        })
    }

    pub fn into_secs1_serial(self) -> SecsResult<Secs1Config> {
        let path = self
            .path
            .clone()
            .ok_or_else(|| SecsError::Config("serial path is required".to_string()))?;
        Ok(Secs1Config {
            common: self.common()?,
            port: Secs1Port::Serial {
                path,
                baud_rate: self.baud_rate,
            },
        })
    }

    pub fn into_secs1_tcp(self, mode: ConnectionMode) -> SecsResult<Secs1Config> {
        let address = self.address();
        let port = match mode {
            ConnectionMode::Active => Secs1Port::TcpActive { address },
            ConnectionMode::Passive => Secs1Port::TcpPassive { address },
        };
        Ok(Secs1Config {
            common: self.common()?,
            port,
        })
    }
}
