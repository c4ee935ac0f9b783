//! SECS-I (SEMI E4) block transfer protocol
//!
//! Messages travel as checksummed blocks of at most 244 data bytes over a
//! half-duplex line, each block preceded by an ENQ/EOT handshake and
//! confirmed with ACK or NAK.

pub mod block;
pub mod checksum;
pub mod communicator;
pub(crate) mod link;

pub use block::{
    ACK, ENQ, EOT, MAX_BLOCK_DATA, MessageAssembler, NAK, Secs1Block, Secs1Header, split_message,
};
pub use checksum::{ChecksumCalc, checksum};
pub use communicator::{Secs1Communicator, Secs1LinkState};
