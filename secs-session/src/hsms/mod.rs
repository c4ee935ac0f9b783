//! HSMS (SEMI E37) over TCP/IP
//!
//! Framing, control messages and the single-session communicator.

pub mod communicator;
pub mod frame;
pub mod header;
pub mod state;

pub use communicator::HsmsCommunicator;
pub use frame::{HsmsFrame, HsmsFrameDecoder};
pub use header::{CONTROL_SESSION_ID, HSMS_HEADER_LENGTH, HsmsHeader, RejectReason, SType, SelectStatus};
pub use state::HsmsConnectionState;
