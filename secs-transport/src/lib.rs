//! Transport layer module for SECS/GEM protocols
//!
//! This crate provides byte-stream transports for TCP (HSMS and SECS-I on
//! TCP/IP) and RS-232 serial lines (SECS-I), plus a TCP acceptor for the
//! passive connection role.

pub mod error;
pub mod listener;
pub mod serial;
pub mod stream;
pub mod tcp;

pub use error::{SecsError, SecsResult};
pub use listener::TcpAcceptor;
pub use serial::{SerialSettings, SerialTransport};
pub use stream::{StreamAccessor, TransportLayer};
pub use tcp::{TcpSettings, TcpTransport};
