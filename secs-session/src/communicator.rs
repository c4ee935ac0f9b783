//! Communicator trait shared by HSMS and SECS-I
//!
//! A communicator is one logical session to a peer. It owns the transport,
//! allocates system bytes for outgoing primaries and correlates replies.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use secs_session::{Communicator, CommunicatorBuilder};
//!
//! # async fn demo() -> secs_session::SecsResult<()> {
//! let host = CommunicatorBuilder::new()
//!     .tcp("127.0.0.1:5000")
//!     .device_id(10)
//!     .build_hsms_active()?;
//! host.open().await?;
//! let reply = host.send(1, 1, true, None).await?;
//! host.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::SecsResult;
use crate::event::CommunicatorEvent;
use crate::statistics::StatisticsSnapshot;
use async_trait::async_trait;
use secs_codec::SecsMessage;
use secs_core::Item;
use tokio::sync::broadcast;

/// Connection abstraction for SECS message exchange
///
/// All methods take `&self`; a communicator can be shared behind an `Arc`
/// and used from several tasks concurrently.
#[async_trait]
pub trait Communicator: Send + Sync {
    /// Establish the transport
    ///
    /// Active HSMS returns once the session is selected. Passive roles
    /// return once the listener is bound; use [`until_ready`](Self::until_ready)
    /// to wait for a peer. Calling `open` on an open communicator is a no-op.
    async fn open(&self) -> SecsResult<()>;

    /// Tear down the transport and stop reconnecting
    ///
    /// Every pending request fails with `ConnectionClosed`.
    async fn close(&self) -> SecsResult<()>;

    /// Send a message with fresh system bytes
    ///
    /// With `w_bit` set, waits for the correlated reply or fails with
    /// `Timeout(T3)`. Without it, returns `None` once the message is written.
    async fn send(
        &self,
        stream: u8,
        function: u8,
        w_bit: bool,
        body: Option<Item>,
    ) -> SecsResult<Option<SecsMessage>>;

    /// Reply to `primary`, reusing its system bytes and device id
    async fn reply(
        &self,
        primary: &SecsMessage,
        stream: u8,
        function: u8,
        body: Option<Item>,
    ) -> SecsResult<()>;

    /// Subscribe to connection and message events
    fn subscribe(&self) -> broadcast::Receiver<CommunicatorEvent>;

    /// Tag used in log lines
    fn name(&self) -> &str;

    fn device_id(&self) -> u16;

    fn is_equip(&self) -> bool;

    /// True when data messages can be exchanged
    fn is_ready(&self) -> bool;

    /// Wait until [`is_ready`](Self::is_ready) holds; fails once closed
    async fn until_ready(&self) -> SecsResult<()>;

    fn statistics(&self) -> StatisticsSnapshot;
}
