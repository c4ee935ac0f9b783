//! GEM layer for SECS/GEM communicators
//!
//! Thin helpers for the SEMI E30 messages most links need before anything
//! else: establishing communications (S1F13/S1F14), on-line and off-line
//! requests (S1F15..S1F18), clock exchange (S2F17/S2F18, S2F31/S2F32) and
//! the S9 error reports.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use secs_gem::Gem;
//! use secs_session::{Communicator, CommunicatorBuilder};
//! use std::sync::Arc;
//!
//! # async fn demo() -> secs_session::SecsResult<()> {
//! let host = Arc::new(
//!     CommunicatorBuilder::new()
//!         .tcp("127.0.0.1:5000")
//!         .device_id(10)
//!         .build_hsms_active()?,
//! );
//! host.open().await?;
//!
//! let gem = Gem::new(host.clone());
//! let commack = gem.s1f13().await?;
//! let clock = gem.s2f17().await?;
//! println!("COMMACK {} equipment time {}", commack, clock.datetime());
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod gem;

pub use clock::{Clock, ClockType};
pub use gem::{CommAck, Gem, OflAck, OnlAck, TiAck};
